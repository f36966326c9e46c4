use serde::{Deserialize, Serialize};
use tracing::debug;

/// Routing-key category token for serial (plain text) payloads.
pub const SERIAL_CATEGORY: &str = "serial";
/// Routing-key category token for structured (JSON) payloads.
pub const JSON_CATEGORY: &str = "json";

/// How a payload's bytes should be interpreted downstream. The ear never
/// parses the body; encoding only decides the blob extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageEncoding {
    Text,
    Json,
}

impl MessageEncoding {
    pub fn ext(&self) -> &str {
        match self {
            MessageEncoding::Text => "txt",
            MessageEncoding::Json => "json",
        }
    }
}

/// One decoded bus delivery. Lives only for the handling of that delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEnvelope {
    /// Alias of the node that published the message, e.g. "atn1"
    pub source_id: String,
    /// Versioned type of the payload, e.g. "gt.sh.status.110"
    pub type_tag: String,
    /// Wall-clock receipt time stamped by the listener, unix milliseconds
    pub received_at_ms: i64,
    /// Raw payload bytes, passed through untouched
    pub body: Vec<u8>,
    pub encoding: MessageEncoding,
}

impl BusEnvelope {
    /// Deterministic blob name for this delivery:
    /// `{source}-{type}-{unix_ms}-{fqdn}.{txt|json}`. Two deliveries naming
    /// the same source/type within one millisecond collide and silently
    /// overwrite; that is accepted, do not disambiguate here.
    pub fn blob_name(&self, fqdn: &str) -> String {
        format!(
            "{}-{}-{}-{}.{}",
            self.source_id,
            self.type_tag,
            self.received_at_ms,
            fqdn,
            self.encoding.ext()
        )
    }
}

/// Decode a routing key of the form `<category>.<source>.<type>` where source
/// and type are dash-separated on the wire ("gt-sh-status-110" carries
/// "gt.sh.status.110"). Returns None for anything malformed; the caller drops
/// those deliveries without further ceremony.
pub fn decode_routing_key(routing_key: &str) -> Option<(String, String, MessageEncoding)> {
    let mut parts = routing_key.split('.');
    let category = parts.next()?;
    let source = parts.next()?;
    let type_part = parts.next()?;
    if parts.next().is_some() {
        debug!("Dropping delivery with over-long routing key {routing_key}");
        return None;
    }

    let encoding = match category {
        SERIAL_CATEGORY => MessageEncoding::Text,
        JSON_CATEGORY => MessageEncoding::Json,
        other => {
            debug!("Dropping delivery with unknown category {other}");
            return None;
        }
    };

    if source.is_empty() || type_part.is_empty() {
        return None;
    }

    Some((
        source.replace('-', "."),
        type_part.replace('-', "."),
        encoding,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_json_routing_key() {
        let (source, type_tag, encoding) =
            decode_routing_key("json.atn1.gt-sh-status-110").unwrap();
        assert_eq!(source, "atn1");
        assert_eq!(type_tag, "gt.sh.status.110");
        assert_eq!(encoding, MessageEncoding::Json);
    }

    #[test]
    fn test_decode_serial_routing_key() {
        let (source, type_tag, encoding) =
            decode_routing_key("serial.d1-isone-ct-newhaven-orange1.gs-pwr-100").unwrap();
        assert_eq!(source, "d1.isone.ct.newhaven.orange1");
        assert_eq!(type_tag, "gs.pwr.100");
        assert_eq!(encoding, MessageEncoding::Text);
    }

    #[test]
    fn test_decode_rejects_unknown_category() {
        assert!(decode_routing_key("mqtt.atn1.gt-sh-status-110").is_none());
    }

    #[test]
    fn test_decode_rejects_missing_segments() {
        assert!(decode_routing_key("json.atn1").is_none());
        assert!(decode_routing_key("json").is_none());
        assert!(decode_routing_key("").is_none());
        assert!(decode_routing_key("json..gt-sh-status-110").is_none());
    }

    #[test]
    fn test_decode_rejects_extra_segments() {
        assert!(decode_routing_key("json.atn1.gt-sh-status-110.extra").is_none());
    }

    #[test]
    fn test_blob_name_format() {
        let envelope = BusEnvelope {
            source_id: "atn1".to_string(),
            type_tag: "gt.sh.status.110".to_string(),
            received_at_ms: 1700000000000,
            body: b"{}".to_vec(),
            encoding: MessageEncoding::Json,
        };
        assert_eq!(
            envelope.blob_name("ear1.example.com"),
            "atn1-gt.sh.status.110-1700000000000-ear1.example.com.json"
        );
    }

    #[test]
    fn test_blob_name_uses_txt_for_serial() {
        let envelope = BusEnvelope {
            source_id: "atn1".to_string(),
            type_tag: "gs.pwr.100".to_string(),
            received_at_ms: 1700000000001,
            body: b"45".to_vec(),
            encoding: MessageEncoding::Text,
        };
        assert!(envelope.blob_name("ear1.example.com").ends_with(".txt"));
    }
}

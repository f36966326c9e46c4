use crate::health::ArchiverHealth;
use crate::spill::SpillCache;
use crate::store::EventStore;
use ear_common::BusEnvelope;
use ractor::{async_trait, Actor, ActorProcessingErr, ActorRef};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

/// Handles one decoded delivery: fast best-effort remote write on the hot
/// path, spill on anything less than success. Retries belong to the hour
/// cadence, never to this path, so per-message latency stays bounded by the
/// store client's own timeouts.
pub struct Ingestor;

pub struct IngestorState {
    store: EventStore,
    spill: SpillCache,
    health: Arc<ArchiverHealth>,
    fqdn: String,
}

pub struct IngestorArgs {
    pub store: EventStore,
    pub spill: SpillCache,
    pub health: Arc<ArchiverHealth>,
    pub fqdn: String,
}

/// The persistence decision for a single delivery. A live remote write is
/// attempted only while the store is believed reachable; a failed message
/// routes the ones after it straight to the spill cache until a write or the
/// minute heartbeat flips the flag back. Returns whether the blob reached
/// the remote store.
pub async fn store_or_spill<F, Fut>(
    envelope: BusEnvelope,
    fqdn: &str,
    believed_up: bool,
    put: F,
    spill: &SpillCache,
) -> bool
where
    F: FnOnce(String, Vec<u8>) -> Fut,
    Fut: Future<Output = bool>,
{
    let blob_name = envelope.blob_name(fqdn);
    let stored = if believed_up {
        put(blob_name.clone(), envelope.body.clone()).await
    } else {
        false
    };
    if !stored {
        if let Err(e) = spill.append(&blob_name, &envelope.body) {
            // the one failure mode with no fallback left; say so loudly
            error!("Could not spill {blob_name} locally, message lost: {e}");
        }
    }
    stored
}

#[async_trait]
impl Actor for Ingestor {
    type Msg = BusEnvelope;
    type State = IngestorState;
    type Arguments = IngestorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: IngestorArgs,
    ) -> Result<Self::State, ActorProcessingErr> {
        debug!("{myself:?} starting");
        Ok(IngestorState {
            store: args.store,
            spill: args.spill,
            health: args.health,
            fqdn: args.fqdn,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        envelope: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.health.record_message_observed();

        let store = state.store.clone();
        store_or_spill(
            envelope,
            &state.fqdn,
            state.health.writes_ok(),
            |blob_name, payload| async move { store.put(&blob_name, payload).await },
            &state.spill,
        )
        .await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ear_common::MessageEncoding;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn envelope() -> BusEnvelope {
        BusEnvelope {
            source_id: "atn1".to_string(),
            type_tag: "gt.sh.status.110".to_string(),
            received_at_ms: 1700000000000,
            body: b"{\"power\":45}".to_vec(),
            encoding: MessageEncoding::Json,
        }
    }

    fn spill_in(dir: &TempDir) -> SpillCache {
        SpillCache::new(dir.path().join("need_to_put").join("d1__1"), false)
    }

    #[tokio::test]
    async fn test_healthy_store_receives_blob_and_spill_stays_empty() {
        let dir = TempDir::new().unwrap();
        let spill = spill_in(&dir);
        let put_names: Mutex<Vec<String>> = Mutex::new(Vec::new());

        let stored = store_or_spill(
            envelope(),
            "ear1.example.com",
            true,
            |name, _payload| {
                put_names.lock().unwrap().push(name);
                async { true }
            },
            &spill,
        )
        .await;

        assert!(stored);
        assert_eq!(
            put_names.into_inner().unwrap(),
            vec!["atn1-gt.sh.status.110-1700000000000-ear1.example.com.json"]
        );
        assert!(spill.list().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_spills_the_exact_blob() {
        let dir = TempDir::new().unwrap();
        let spill = spill_in(&dir);

        let stored = store_or_spill(
            envelope(),
            "ear1.example.com",
            true,
            |_name, _payload| async { false },
            &spill,
        )
        .await;

        assert!(!stored);
        assert_eq!(
            spill.list(),
            vec!["atn1-gt.sh.status.110-1700000000000-ear1.example.com.json"]
        );

        // once the store comes back, a drain empties the cache
        spill.drain_once(|_name, _payload| async { true }).await;
        assert!(spill.list().is_empty());
    }

    #[tokio::test]
    async fn test_believed_down_store_is_not_attempted() {
        let dir = TempDir::new().unwrap();
        let spill = spill_in(&dir);
        let attempted = Mutex::new(false);

        let stored = store_or_spill(
            envelope(),
            "ear1.example.com",
            false,
            |_name, _payload| {
                *attempted.lock().unwrap() = true;
                async { true }
            },
            &spill,
        )
        .await;

        assert!(!stored);
        assert!(!*attempted.lock().unwrap());
        assert_eq!(spill.list().len(), 1);
    }

    #[tokio::test]
    async fn test_spilled_bytes_match_the_original_payload() {
        let dir = TempDir::new().unwrap();
        let spill = spill_in(&dir);

        store_or_spill(
            envelope(),
            "ear1.example.com",
            false,
            |_name, _payload| async { false },
            &spill,
        )
        .await;

        let seen: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());
        spill
            .drain_once(|_name, payload| {
                seen.lock().unwrap().push(payload);
                async { true }
            })
            .await;
        assert_eq!(seen.into_inner().unwrap(), vec![b"{\"power\":45}".to_vec()]);
    }
}

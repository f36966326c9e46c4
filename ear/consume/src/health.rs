use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Minimum age of the hour marker before a zero-messages hour may alert.
pub const SILENCE_DEBOUNCE_S: i64 = 1800;

/// Health state shared between the delivery path and the maintenance loop.
///
/// Both sides read and write concurrently with relaxed ordering on purpose: a
/// momentarily stale health flag or an off-by-one hourly count is acceptable
/// here, and neither side may ever block the other.
pub struct ArchiverHealth {
    writes_currently_succeeding: AtomicBool,
    messages_heard_this_hour: AtomicU64,
}

impl ArchiverHealth {
    /// Starts pessimistic: the store is not believed reachable until a write
    /// (real or heartbeat) proves otherwise.
    pub fn new() -> Self {
        ArchiverHealth {
            writes_currently_succeeding: AtomicBool::new(false),
            messages_heard_this_hour: AtomicU64::new(0),
        }
    }

    pub fn writes_ok(&self) -> bool {
        self.writes_currently_succeeding.load(Ordering::Relaxed)
    }

    pub fn set_write_outcome(&self, ok: bool) {
        self.writes_currently_succeeding.store(ok, Ordering::Relaxed);
    }

    /// Called once per decodable inbound message, whatever its storage fate.
    pub fn record_message_observed(&self) {
        self.messages_heard_this_hour.fetch_add(1, Ordering::Relaxed);
    }

    pub fn heard_this_hour(&self) -> u64 {
        self.messages_heard_this_hour.load(Ordering::Relaxed)
    }

    /// Hour-cadence reset; runs whether or not the hour's other work did.
    pub fn reset_hourly(&self) {
        self.messages_heard_this_hour.store(0, Ordering::Relaxed);
    }
}

impl Default for ArchiverHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// The debounced silence rule: a zero-message hour alerts only when the hour
/// marker is old enough that this is not just a freshly (re)started process
/// or a marker that only just advanced.
pub fn silence_alert_due(heard_this_hour: u64, now_unix_s: i64, hour_marker_unix_s: i64) -> bool {
    heard_this_hour == 0 && now_unix_s - hour_marker_unix_s > SILENCE_DEBOUNCE_S
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_alerts_after_quiet_hour_with_stale_marker() {
        assert!(silence_alert_due(0, 10000, 10000 - 3600));
    }

    #[test]
    fn test_no_alert_when_messages_were_heard() {
        assert!(!silence_alert_due(7, 10000, 10000 - 3600));
    }

    #[test]
    fn test_no_alert_inside_debounce_window() {
        assert!(!silence_alert_due(0, 10000, 10000 - 1200));
        // exactly at the boundary still holds its tongue
        assert!(!silence_alert_due(0, 10000, 10000 - SILENCE_DEBOUNCE_S));
    }

    #[test]
    fn test_hourly_counter_resets() {
        let health = ArchiverHealth::new();
        health.record_message_observed();
        health.record_message_observed();
        assert_eq!(health.heard_this_hour(), 2);
        health.reset_hourly();
        assert_eq!(health.heard_this_hour(), 0);
    }

    #[test]
    fn test_health_starts_pessimistic() {
        let health = ArchiverHealth::new();
        assert!(!health.writes_ok());
        health.set_write_outcome(true);
        assert!(health.writes_ok());
        health.set_write_outcome(false);
        assert!(!health.writes_ok());
    }
}

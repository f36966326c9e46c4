use chrono::{DateTime, Utc};
use tracing::warn;

/// UTC calendar day bucket, e.g. "20231114".
pub fn time_based_subfolder(unix_s: i64) -> String {
    match DateTime::<Utc>::from_timestamp(unix_s, 0) {
        Some(t) => t.format("%Y%m%d").to_string(),
        None => {
            warn!("Timestamp {unix_s} out of range, falling back to epoch day");
            "19700101".to_string()
        }
    }
}

/// Full output prefix for a world instance at a point in time, following the
/// `hw1__1/eventstore/YYYYMMDD` convention. Pure function of its inputs;
/// write paths call this live so an in-flight write near midnight always
/// lands in the correct day.
pub fn partition_key(world_instance_alias: &str, unix_s: i64) -> String {
    format!(
        "{}/eventstore/{}",
        world_instance_alias,
        time_based_subfolder(unix_s)
    )
}

/// Cached partition key, consulted only by the day cadence to notice (and
/// log) rotations. Never consulted on a write path.
pub struct RotationCheck {
    world_instance_alias: String,
    current: String,
}

impl RotationCheck {
    pub fn new(world_instance_alias: &str, now_unix_s: i64) -> Self {
        RotationCheck {
            world_instance_alias: world_instance_alias.to_string(),
            current: partition_key(world_instance_alias, now_unix_s),
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// If the freshly computed key has advanced past the cached one, update
    /// the cache and return the key that was displaced. The partition only
    /// ever moves forward; a clock step backwards leaves the cache alone.
    pub fn check(&mut self, now_unix_s: i64) -> Option<String> {
        let fresh = partition_key(&self.world_instance_alias, now_unix_s);
        if fresh > self.current {
            let previous = std::mem::replace(&mut self.current, fresh);
            Some(previous)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2023-11-14 22:13:20 UTC
    const T0: i64 = 1700000000;

    #[test]
    fn test_partition_key_is_pure_within_a_day() {
        assert_eq!(
            partition_key("hw1__1", T0),
            partition_key("hw1__1", T0 + 3600)
        );
    }

    #[test]
    fn test_partition_key_changes_across_days() {
        assert_ne!(
            partition_key("hw1__1", T0),
            partition_key("hw1__1", T0 + 86400)
        );
    }

    #[test]
    fn test_partition_key_format() {
        assert_eq!(partition_key("hw1__1", T0), "hw1__1/eventstore/20231114");
    }

    #[test]
    fn test_rotation_fires_once_per_new_day() {
        let mut rotation = RotationCheck::new("hw1__1", T0);
        assert!(rotation.check(T0 + 60).is_none());
        let previous = rotation.check(T0 + 86400);
        assert_eq!(previous.as_deref(), Some("hw1__1/eventstore/20231114"));
        assert_eq!(rotation.current(), "hw1__1/eventstore/20231115");
        assert!(rotation.check(T0 + 86400).is_none());
    }

    #[test]
    fn test_rotation_never_reverts() {
        let mut rotation = RotationCheck::new("hw1__1", T0 + 86400);
        assert!(rotation.check(T0).is_none());
        assert_eq!(rotation.current(), "hw1__1/eventstore/20231115");
    }
}

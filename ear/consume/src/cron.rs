use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

pub const MINUTE_S: i64 = 60;
pub const HOUR_S: i64 = 3600;
pub const DAY_S: i64 = 86400;

/// The persisted half of a cadence: a tiny JSON record rewritten after every
/// successful fire, so a restarted process resumes from real elapsed time
/// instead of firing everything immediately.
#[derive(Debug, Serialize, Deserialize)]
struct CadenceRecord {
    last_fired_unix_s: i64,
}

/// One maintenance cadence (minute, hour or day). Firing is governed by
/// boundary arithmetic, not counters: the next fire time is the first period
/// boundary after the last fire, so calling [`Cadence::due`] twice with the
/// same clock can only fire once.
pub struct Cadence {
    period_s: i64,
    last_fired_unix_s: i64,
    marker_file: PathBuf,
}

impl Cadence {
    /// Load the persisted marker, or initialize one aligned down to the
    /// current period boundary when none exists (first boot, wiped state
    /// dir, or an unreadable record).
    pub fn load_or_init(period_s: i64, marker_file: &Path, now_unix_s: i64) -> Self {
        let last_fired_unix_s = match read_marker(marker_file) {
            Some(record) => record.last_fired_unix_s,
            None => {
                let aligned = now_unix_s - (now_unix_s % period_s);
                let cadence = Cadence {
                    period_s,
                    last_fired_unix_s: aligned,
                    marker_file: marker_file.to_path_buf(),
                };
                cadence.persist();
                return cadence;
            }
        };
        Cadence {
            period_s,
            last_fired_unix_s,
            marker_file: marker_file.to_path_buf(),
        }
    }

    pub fn last_fired_unix_s(&self) -> i64 {
        self.last_fired_unix_s
    }

    pub fn next_fire_unix_s(&self) -> i64 {
        (self.last_fired_unix_s / self.period_s) * self.period_s + self.period_s
    }

    pub fn due(&self, now_unix_s: i64) -> bool {
        now_unix_s > self.next_fire_unix_s()
    }

    /// Record a fire at `now` and persist it. A persistence failure costs us
    /// restart fidelity, not correctness, so it is logged and tolerated.
    pub fn mark_fired(&mut self, now_unix_s: i64) {
        self.last_fired_unix_s = now_unix_s;
        self.persist();
    }

    fn persist(&self) {
        let record = CadenceRecord {
            last_fired_unix_s: self.last_fired_unix_s,
        };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.marker_file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.marker_file, serde_json::to_vec(&record)?)?;
            Ok(())
        };
        if let Err(e) = write() {
            error!(
                "Could not persist cadence marker {}: {e}",
                self.marker_file.display()
            );
        }
    }
}

fn read_marker(marker_file: &Path) -> Option<CadenceRecord> {
    let bytes = std::fs::read(marker_file).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!(
                "Ignoring unreadable cadence marker {}: {e}",
                marker_file.display()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_next_fire_is_first_boundary_after_last_fire() {
        let dir = TempDir::new().unwrap();
        let mut cadence = Cadence::load_or_init(MINUTE_S, &dir.path().join("minute.json"), 0);
        cadence.mark_fired(65);
        assert_eq!(cadence.next_fire_unix_s(), 120);
    }

    #[test]
    fn test_due_is_strictly_after_the_boundary() {
        let dir = TempDir::new().unwrap();
        let cadence = Cadence::load_or_init(MINUTE_S, &dir.path().join("minute.json"), 0);
        assert!(!cadence.due(60));
        assert!(cadence.due(61));
    }

    #[test]
    fn test_double_tick_fires_once() {
        let dir = TempDir::new().unwrap();
        let now = 3600 * 100 + 30;
        let mut cadence = Cadence::load_or_init(HOUR_S, &dir.path().join("hour.json"), now);
        let fire_at = cadence.next_fire_unix_s() + 1;
        assert!(cadence.due(fire_at));
        cadence.mark_fired(fire_at);
        assert!(!cadence.due(fire_at));
    }

    #[test]
    fn test_restart_resumes_from_persisted_marker() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("day.json");
        {
            let mut cadence = Cadence::load_or_init(DAY_S, &marker, 86400 * 10);
            cadence.mark_fired(86400 * 10 + 500);
        }
        // a much later "restart" must see the old marker, not re-align to now
        let resumed = Cadence::load_or_init(DAY_S, &marker, 86400 * 12);
        assert_eq!(resumed.last_fired_unix_s(), 86400 * 10 + 500);
        assert!(resumed.due(86400 * 12));
    }

    #[test]
    fn test_fresh_state_aligns_down_to_boundary() {
        let dir = TempDir::new().unwrap();
        let cadence = Cadence::load_or_init(HOUR_S, &dir.path().join("hour.json"), 3600 * 5 + 1234);
        assert_eq!(cadence.last_fired_unix_s(), 3600 * 5);
        // a fresh boot does not owe a fire for the partial period behind it
        assert!(!cadence.due(3600 * 5 + 1300));
    }

    #[test]
    fn test_corrupt_marker_reinitializes() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("minute.json");
        std::fs::write(&marker, b"not json").unwrap();
        let cadence = Cadence::load_or_init(MINUTE_S, &marker, 600 + 30);
        assert_eq!(cadence.last_fired_unix_s(), 600);
    }
}

/*
   Ear (OSS)

   Copyright 2024 Carnegie Mellon University.

   NO WARRANTY. THIS CARNEGIE MELLON UNIVERSITY AND SOFTWARE ENGINEERING INSTITUTE MATERIAL IS
   FURNISHED ON AN "AS-IS" BASIS. CARNEGIE MELLON UNIVERSITY MAKES NO WARRANTIES OF ANY KIND,
   EITHER EXPRESSED OR IMPLIED, AS TO ANY MATTER INCLUDING, BUT NOT LIMITED TO, WARRANTY OF FITNESS
   FOR PURPOSE OR MERCHANTABILITY, EXCLUSIVITY, OR RESULTS OBTAINED FROM USE OF THE MATERIAL.
   CARNEGIE MELLON UNIVERSITY DOES NOT MAKE ANY WARRANTY OF ANY KIND WITH RESPECT TO FREEDOM FROM
   PATENT, TRADEMARK, OR COPYRIGHT INFRINGEMENT.

   Licensed under a MIT-style license, please see license.txt or contact permission@sei.cmu.edu for
   full terms.

   [DISTRIBUTION STATEMENT A] This material has been approved for public release and unlimited
   distribution.  Please see Copyright notice for non-US Government use and distribution.

   This Software includes and/or makes use of Third-Party Software each subject to its own license.

   DM24-0470
*/

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Local fallback persistence for blobs that failed their remote write:
/// one file per blob name under `need_to_put/<world instance>`.
///
/// Cheap to clone; the ingest path appends while the maintenance loop drains
/// the same directory.
#[derive(Clone)]
pub struct SpillCache {
    dir: PathBuf,
    dev_world: bool,
    purged_once: Arc<AtomicBool>,
}

impl SpillCache {
    pub fn new(dir: PathBuf, dev_world: bool) -> Self {
        SpillCache {
            dir,
            dev_world,
            purged_once: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Persist one record, creating the directory on first use. Dev worlds
    /// are ephemeral and must not accumulate records across repeated local
    /// runs, so the first append of this process's lifetime flushes whatever
    /// an earlier run left behind. The record lands via a temp file and
    /// rename so a concurrent drain never sees a truncated payload.
    pub fn append(&self, blob_name: &str, payload: &[u8]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        if self.dev_world && !self.purged_once.swap(true, Ordering::SeqCst) {
            debug!(
                "dev world, so flushing all old data from {}",
                self.dir.display()
            );
            self.purge();
        }

        let tmp = self.dir.join(format!("{blob_name}.tmp"));
        let target = self.dir.join(blob_name);
        std::fs::write(&tmp, payload)?;
        std::fs::rename(&tmp, &target)?;
        debug!("wrote to {}", target.display());
        Ok(())
    }

    /// Delete every stored record. Only ever invoked for dev worlds.
    fn purge(&self) {
        for name in self.list() {
            if name.ends_with(".json") || name.ends_with(".txt") {
                if let Err(e) = std::fs::remove_file(self.dir.join(&name)) {
                    warn!("Could not flush stale spill record {name}: {e}");
                }
            }
        }
    }

    /// Current record names, in no particular order. Half-written temp files
    /// are not records and are excluded.
    pub fn list(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.ends_with(".tmp"))
            .collect()
    }

    /// One best-effort repair pass: for each record, hand its bytes to
    /// `write` and delete the record iff the write reports success. Records
    /// are processed one at a time; a failure leaves that record and the
    /// rest untouched for the next cadence.
    pub async fn drain_once<F, Fut>(&self, write: F)
    where
        F: Fn(String, Vec<u8>) -> Fut,
        Fut: Future<Output = bool>,
    {
        for blob_name in self.list() {
            let path = self.dir.join(&blob_name);
            let payload = match std::fs::read(&path) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Could not read spill record {blob_name}: {e}");
                    continue;
                }
            };
            if write(blob_name.clone(), payload).await {
                match std::fs::remove_file(&path) {
                    Ok(()) => info!("Put cached {blob_name} in S3 and deleted locally"),
                    Err(e) => warn!("Stored {blob_name} but could not delete it locally: {e}"),
                }
            }
        }
    }
}

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

use crate::health::ArchiverHealth;
use crate::partition;
use crate::EarSettings;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// The remote side of the archive: every blob this daemon is responsible for
/// ends up behind [`EventStore::put`]. The store never raises to callers —
/// every failure mode collapses to `false` and a health-flag update, and the
/// hour cadence repairs from the spill cache later.
#[derive(Clone)]
pub struct EventStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    world_instance_alias: String,
    world_alias_root: String,
    fqdn: String,
    health: Arc<ArchiverHealth>,
}

impl EventStore {
    pub async fn connect(settings: &EarSettings, health: Arc<ArchiverHealth>) -> Self {
        let config = aws_config::load_from_env().await;
        EventStore {
            client: aws_sdk_s3::Client::new(&config),
            bucket: settings.bucket_name.clone(),
            world_instance_alias: settings.world_instance_alias.clone(),
            world_alias_root: settings.world_alias_root().to_string(),
            fqdn: settings.my_fqdn.clone(),
            health,
        }
    }

    /// The current output prefix. Recomputed on every write so a put racing
    /// the midnight rotation still lands in the right day.
    pub fn output_folder_root(&self) -> String {
        partition::partition_key(&self.world_instance_alias, Utc::now().timestamp())
    }

    /// The core function of this agent: put one blob into the current
    /// partition. Connection failures, client rejections and non-2xx
    /// responses all come back as `false`; a clean response is `true`. Either
    /// way the shared health flag records the outcome for the ingest path
    /// and the health monitor.
    pub async fn put(&self, blob_name: &str, payload: Vec<u8>) -> bool {
        let path_name = format!("{}/{}", self.output_folder_root(), blob_name);

        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&path_name)
            .body(ByteStream::from(payload))
            .send()
            .await;

        let put_worked = match result {
            Ok(_) => {
                debug!("put of {path_name} worked");
                true
            }
            Err(SdkError::DispatchFailure(e)) => {
                info!("connection failure putting {path_name}: {e:?}");
                false
            }
            Err(SdkError::ServiceError(context)) => {
                info!(
                    "HttpStatusCode {} putting {path_name}",
                    context.raw().status().as_u16()
                );
                false
            }
            Err(e) => {
                info!("unknown error type putting {path_name}: {e}");
                false
            }
        };

        self.health.set_write_outcome(put_worked);
        put_worked
    }

    /// Synthetic probe write, independent of real traffic. The blob name is
    /// load-bearing for downstream tooling:
    /// `{world root}-heartbeat.a-0-{fqdn}.txt`.
    pub async fn heartbeat(&self) -> bool {
        let payload = json!({
            "EarDns": self.fqdn,
            "UnixTimeMs": Utc::now().timestamp_millis(),
        })
        .to_string();
        let blob_name = format!("{}-heartbeat.a-0-{}.txt", self.world_alias_root, self.fqdn);
        self.put(&blob_name, payload.into_bytes()).await
    }

    /// Total bytes stored under a prefix, for operator logging at partition
    /// rotation. Best effort; None when the listing fails.
    pub async fn partition_size(&self, prefix: &str) -> Option<i64> {
        let mut total: i64 = 0;
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();
        while let Some(page) = pages.next().await {
            match page {
                Ok(page) => {
                    for object in page.contents() {
                        total += object.size().unwrap_or(0);
                    }
                }
                Err(e) => {
                    info!("could not size partition {prefix}: {e}");
                    return None;
                }
            }
        }
        Some(total)
    }
}

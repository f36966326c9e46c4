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

use serde_json::json;
use tracing::{debug, warn};

/// Operator warnings the ear can raise through the Slack webhook sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarWarning {
    AppearsDead,
    HeardNoMessagesForAnHour,
}

impl EarWarning {
    pub fn as_str(&self) -> &str {
        match self {
            EarWarning::AppearsDead => "EarAppearsDead",
            EarWarning::HeardNoMessagesForAnHour => "EarHeardNoMessagesForAnHour",
        }
    }
}

pub fn init_logging() {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_err()
    {
        eprintln!("Logging registry already initialized");
    }
}

/// Fire a warning at the operator channel. Returns the webhook's status code,
/// or None if the post never produced one. Delivery failures are logged and
/// swallowed; callers must not branch on the outcome.
pub async fn send_warning_to_slack(
    client: &reqwest::Client,
    webhook_url: &str,
    warning: EarWarning,
    warning_message: &str,
) -> Option<u16> {
    post_blocks(
        client,
        webhook_url,
        format!(
            "*S3 Ear Warning!:*\n {}: {}",
            warning.as_str(),
            warning_message
        ),
    )
    .await
}

/// Companion to [`send_warning_to_slack`] for the all-clear.
pub async fn send_recovery_to_slack(
    client: &reqwest::Client,
    webhook_url: &str,
    warning: EarWarning,
    recovery_message: &str,
) -> Option<u16> {
    post_blocks(
        client,
        webhook_url,
        format!(
            "*S3 Ear Recovery!:*\n {}: {}",
            warning.as_str(),
            recovery_message
        ),
    )
    .await
}

async fn post_blocks(client: &reqwest::Client, webhook_url: &str, text: String) -> Option<u16> {
    let payload = json!({
        "text": "fallback",
        "blocks": [
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": text }
            }
        ]
    });

    match client.post(webhook_url).json(&payload).send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            debug!("Webhook responded with status {status}");
            Some(status)
        }
        Err(e) => {
            warn!("No status code returned in webhook response! {e}");
            None
        }
    }
}

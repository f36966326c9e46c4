use crate::cron::{Cadence, DAY_S, HOUR_S, MINUTE_S};
use crate::health::{silence_alert_due, ArchiverHealth};
use crate::partition::RotationCheck;
use crate::spill::SpillCache;
use crate::store::EventStore;
use chrono::Utc;
use ear::{send_recovery_to_slack, send_warning_to_slack, EarWarning};
use ractor::concurrency::Duration;
use ractor::{async_trait, Actor, ActorProcessingErr, ActorRef};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// The scheduled half of the daemon: one actor, woken once a second, running
/// the three cadences in fixed order minute -> hour -> day inside a single
/// handler. A wake-up that is late for several cadences fires all of them in
/// that order; ticks can never overlap.
pub struct Maintenance;

pub enum MaintenanceMessage {
    Tick,
}

pub struct MaintenanceState {
    store: EventStore,
    spill: SpillCache,
    health: Arc<ArchiverHealth>,
    minute: Cadence,
    hour: Cadence,
    day: Cadence,
    rotation: RotationCheck,
    web_client: reqwest::Client,
    webhook_url: Option<String>,
    fqdn: String,
    /// set while an unanswered silence warning is outstanding
    silence_alerted: bool,
    tick_handle: Option<AbortHandle>,
}

pub struct MaintenanceArgs {
    pub store: EventStore,
    pub spill: SpillCache,
    pub health: Arc<ArchiverHealth>,
    pub marker_dir: PathBuf,
    pub world_instance_alias: String,
    pub webhook_url: Option<String>,
    pub fqdn: String,
}

impl Maintenance {
    /// Minute action: re-probe the store with a synthetic write, whatever the
    /// cached health claims. A down->up transition is worth telling the
    /// operator about.
    async fn run_minute(state: &mut MaintenanceState) {
        let was_ok = state.health.writes_ok();
        state.store.heartbeat().await;
        if !was_ok && state.health.writes_ok() {
            info!("Event store writes are succeeding again");
        }
        debug!("Ran cron every minute");
    }

    /// Hour action: debounced silence alerting against the pre-update hour
    /// marker, counter reset, then a health-gated drain. The cadence clock
    /// advances in the caller regardless of whether the drain ran, so an
    /// unhealthy store cannot stall the hour cadence.
    async fn run_hour(state: &mut MaintenanceState, now_unix_s: i64) {
        let heard = state.health.heard_this_hour();

        if silence_alert_due(heard, now_unix_s, state.hour.last_fired_unix_s()) {
            let warning_message = format!("Ear service {} heard 0 messages last hour", state.fqdn);
            warn!("{warning_message}");
            if let Some(url) = &state.webhook_url {
                send_warning_to_slack(
                    &state.web_client,
                    url,
                    EarWarning::HeardNoMessagesForAnHour,
                    &warning_message,
                )
                .await;
            }
            state.silence_alerted = true;
        } else if state.silence_alerted && heard > 0 {
            let recovery_message =
                format!("Ear service {} heard {heard} messages this hour", state.fqdn);
            if let Some(url) = &state.webhook_url {
                send_recovery_to_slack(
                    &state.web_client,
                    url,
                    EarWarning::HeardNoMessagesForAnHour,
                    &recovery_message,
                )
                .await;
            }
            state.silence_alerted = false;
        }

        state.health.reset_hourly();

        if state.health.writes_ok() {
            let store = state.store.clone();
            state
                .spill
                .drain_once(|blob_name, payload| {
                    let store = store.clone();
                    async move { store.put(&blob_name, payload).await }
                })
                .await;
        }
        info!("Ran cron every hour");
    }

    /// Day action: notice the UTC date rolling over and report how much the
    /// closed partition held.
    async fn run_day(state: &mut MaintenanceState, now_unix_s: i64) {
        if let Some(previous) = state.rotation.check(now_unix_s) {
            info!("output folder root is now {}", state.rotation.current());
            if let Some(bytes) = state.store.partition_size(&previous).await {
                info!("closed partition {previous} holds {bytes} bytes");
            }
        }
        info!("Ran cron every day");
    }
}

#[async_trait]
impl Actor for Maintenance {
    type Msg = MaintenanceMessage;
    type State = MaintenanceState;
    type Arguments = MaintenanceArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: MaintenanceArgs,
    ) -> Result<Self::State, ActorProcessingErr> {
        debug!("{myself:?} starting");
        let now = Utc::now().timestamp();
        Ok(MaintenanceState {
            minute: Cadence::load_or_init(MINUTE_S, &args.marker_dir.join("minute.json"), now),
            hour: Cadence::load_or_init(HOUR_S, &args.marker_dir.join("hour.json"), now),
            day: Cadence::load_or_init(DAY_S, &args.marker_dir.join("day.json"), now),
            rotation: RotationCheck::new(&args.world_instance_alias, now),
            store: args.store,
            spill: args.spill,
            health: args.health,
            web_client: reqwest::Client::new(),
            webhook_url: args.webhook_url,
            fqdn: args.fqdn,
            silence_alerted: false,
            tick_handle: None,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let handle = myself
            .send_interval(Duration::from_secs(1), || MaintenanceMessage::Tick)
            .abort_handle();
        state.tick_handle = Some(handle);
        info!("{myself:?} started");
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(handle) = state.tick_handle.take() {
            handle.abort();
        }
        Ok(())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            MaintenanceMessage::Tick => {
                let now = Utc::now().timestamp();
                if state.minute.due(now) {
                    Self::run_minute(state).await;
                    state.minute.mark_fired(now);
                }
                if state.hour.due(now) {
                    Self::run_hour(state, now).await;
                    state.hour.mark_fired(now);
                }
                if state.day.due(now) {
                    Self::run_day(state, now).await;
                    state.day.mark_fired(now);
                }
            }
        }
        Ok(())
    }
}

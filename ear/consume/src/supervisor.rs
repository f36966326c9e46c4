use crate::health::ArchiverHealth;
use crate::ingest::{Ingestor, IngestorArgs};
use crate::listener::{AmqpListener, AmqpListenerArgs};
use crate::maintenance::{Maintenance, MaintenanceArgs};
use crate::spill::SpillCache;
use crate::store::EventStore;
use crate::{EarSettings, UniverseType, EAR_INGESTOR, EAR_LISTENER, EAR_MAINTENANCE};
use ractor::{async_trait, Actor, ActorProcessingErr, ActorRef, SupervisionEvent};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Root of the agent's supervision tree: builds settings and shared state,
/// then links the listener, ingestor and maintenance actors beneath itself.
pub struct EarSupervisor;

pub struct EarSupervisorState;

#[async_trait]
impl Actor for EarSupervisor {
    type Msg = ();
    type State = EarSupervisorState;
    type Arguments = ();

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        _args: (),
    ) -> Result<Self::State, ActorProcessingErr> {
        debug!("{myself:?} starting");

        let settings = EarSettings::from_env();
        let universe = settings.universe_type().map_err(ActorProcessingErr::from)?;
        info!(
            "Archiving world instance {} ({universe:?} universe) to bucket {}",
            settings.world_instance_alias, settings.bucket_name
        );

        let health = Arc::new(ArchiverHealth::new());
        let store = EventStore::connect(&settings, health.clone()).await;
        let spill = SpillCache::new(settings.spill_dir(), universe == UniverseType::Dev);

        let (ingestor, _) = Actor::spawn_linked(
            Some(EAR_INGESTOR.to_string()),
            Ingestor,
            IngestorArgs {
                store: store.clone(),
                spill: spill.clone(),
                health: health.clone(),
                fqdn: settings.my_fqdn.clone(),
            },
            myself.clone().into(),
        )
        .await?;

        Actor::spawn_linked(
            Some(EAR_MAINTENANCE.to_string()),
            Maintenance,
            MaintenanceArgs {
                store,
                spill,
                health,
                marker_dir: settings.cron_marker_dir(),
                world_instance_alias: settings.world_instance_alias.clone(),
                webhook_url: settings.slack_webhook_url.clone(),
                fqdn: settings.my_fqdn.clone(),
            },
            myself.clone().into(),
        )
        .await?;

        Actor::spawn_linked(
            Some(EAR_LISTENER.to_string()),
            AmqpListener,
            AmqpListenerArgs {
                amqp_uri: settings.amqp_uri.clone(),
                exchange: settings.exchange.clone(),
                ingestor,
            },
            myself.clone().into(),
        )
        .await?;

        Ok(EarSupervisorState)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        _message: Self::Msg,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        msg: SupervisionEvent,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match msg {
            SupervisionEvent::ActorStarted(actor_cell) => {
                info!(
                    "EAR_SUPERVISOR: {0:?}:{1:?} started",
                    actor_cell.get_name(),
                    actor_cell.get_id()
                );
            }
            SupervisionEvent::ActorTerminated(actor_cell, _, reason) => {
                info!(
                    "EAR_SUPERVISOR: {0:?}:{1:?} terminated. {reason:?}",
                    actor_cell.get_name(),
                    actor_cell.get_id()
                );
                // the agent is useless without its bus feed; stop and let the
                // process-level supervisor (systemd, k8s) restart us clean
                if actor_cell.get_name().as_deref() == Some(EAR_LISTENER) {
                    myself.stop(Some("listener terminated".to_string()));
                }
            }
            SupervisionEvent::ActorFailed(actor_cell, e) => {
                warn!(
                    "EAR_SUPERVISOR: {0:?}:{1:?} failed! {e:?}",
                    actor_cell.get_name(),
                    actor_cell.get_id()
                );
                myself.stop(Some("child failed".to_string()));
            }
            SupervisionEvent::ProcessGroupChanged(..) => (),
        }

        Ok(())
    }
}

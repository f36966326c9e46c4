use chrono::Utc;
use ear_common::{decode_routing_key, BusEnvelope};
use futures_lite::stream::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use ractor::{async_trait, Actor, ActorProcessingErr, ActorRef};
use tracing::{debug, error, info, warn};

/// The bus boundary. Owns the AMQP connection, acknowledges every delivery
/// on receipt, and forwards the ones that decode to the ingestor. Topic
/// decoding beyond the routing key is upstream's responsibility.
pub struct AmqpListener;

pub struct AmqpListenerState {
    // held so the broker session outlives pre_start
    _connection: Connection,
    _channel: Channel,
    consumer: Option<Consumer>,
    ingestor: ActorRef<BusEnvelope>,
}

pub struct AmqpListenerArgs {
    pub amqp_uri: String,
    pub exchange: String,
    pub ingestor: ActorRef<BusEnvelope>,
}

#[async_trait]
impl Actor for AmqpListener {
    type Msg = ();
    type State = AmqpListenerState;
    type Arguments = AmqpListenerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: AmqpListenerArgs,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!("{myself:?} connecting to {}", args.amqp_uri);
        let connection =
            Connection::connect(&args.amqp_uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &args.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_bind(
                queue.name().as_str(),
                &args.exchange,
                "#",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let consumer = channel
            .basic_consume(
                queue.name().as_str(),
                crate::EAR_LISTENER,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(AmqpListenerState {
            _connection: connection,
            _channel: channel,
            consumer: Some(consumer),
            ingestor: args.ingestor,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let Some(mut consumer) = state.consumer.take() else {
            return Ok(());
        };
        let ingestor = state.ingestor.clone();

        info!("{myself:?} listening...");
        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        error!("Transport error on consumer stream: {e}");
                        break;
                    }
                };

                let routing_key = delivery.routing_key.as_str().to_string();
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    warn!("Could not acknowledge delivery for {routing_key}: {e}");
                }

                let Some((source_id, type_tag, encoding)) = decode_routing_key(&routing_key)
                else {
                    debug!("IGNORING MESSAGE with routing key {routing_key}");
                    continue;
                };

                let envelope = BusEnvelope {
                    source_id,
                    type_tag,
                    received_at_ms: Utc::now().timestamp_millis(),
                    body: delivery.data,
                    encoding,
                };
                if let Err(e) = ingestor.cast(envelope) {
                    error!("Could not forward delivery to the ingestor: {e}");
                    break;
                }
            }
            myself.stop(Some("consumer stream closed".to_string()));
        });

        Ok(())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        _message: Self::Msg,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        Ok(())
    }
}

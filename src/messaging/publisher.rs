use crate::{messaging::config::RabbitMqConfig, model::structures::release::ReleaseOutcome};
use chrono::{DateTime, NaiveDate, Utc};
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::{AMQPValue, FieldTable, LongString, ShortString},
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Failed to connect to RabbitMQ: {0}")]
    ConnectionError(#[from] lapin::Error),

    #[error("Failed to serialize message: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Publisher not initialized")]
    NotInitialized
}

/// Sent once a release is committed. Carries the constants the
/// tournament-scoring subsystem needs for the next tournaments.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReleaseCalculatedMessage {
    pub release_date: NaiveDate,
    pub q: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bonus_scale: Option<f64>,
    /// True when Q could not be calibrated and was carried over
    pub q_stale: bool,
    pub teams: usize,
    pub players: usize,
    pub calculated_at: DateTime<Utc>
}

impl ReleaseCalculatedMessage {
    pub fn from_outcome(outcome: &ReleaseOutcome) -> Self {
        let snapshot = &outcome.snapshot;

        ReleaseCalculatedMessage {
            release_date: snapshot.date,
            q: snapshot.q,
            bonus_scale: snapshot.bonus_scale,
            q_stale: outcome.q_calibration.is_stale(),
            teams: snapshot.teams.len(),
            players: snapshot.players.len(),
            calculated_at: Utc::now()
        }
    }
}

/// MassTransit message envelope structure
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MassTransitEnvelope<T> {
    message_id: String,
    conversation_id: String,
    source_address: String,
    destination_address: String,
    message_type: Vec<String>,
    message: T,
    sent_time: DateTime<Utc>
}

/// RabbitMQ publisher for release events
pub struct RabbitMqPublisher {
    connection: Option<Arc<Connection>>,
    channel: Option<Channel>,
    exchange: String,
    routing_key: String
}

impl RabbitMqPublisher {
    pub fn new(exchange: String, routing_key: String) -> Self {
        Self {
            connection: None,
            channel: None,
            exchange,
            routing_key
        }
    }

    pub fn from_config(config: &RabbitMqConfig) -> Self {
        Self::new(config.exchange.clone(), config.routing_key.clone())
    }

    /// Creates and connects a publisher from configuration
    pub async fn connect_from_config(config: &RabbitMqConfig) -> Result<Self, PublisherError> {
        let mut publisher = Self::from_config(config);
        publisher.connect(&config.connection_url()).await?;
        Ok(publisher)
    }

    /// Connects to RabbitMQ and declares the exchange
    pub async fn connect(&mut self, rabbitmq_url: &str) -> Result<(), PublisherError> {
        let connection = Connection::connect(rabbitmq_url, ConnectionProperties::default()).await?;
        let connection = Arc::new(connection);

        let channel = connection.create_channel().await?;

        // Fanout: every consumer of release events gets a copy
        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default()
            )
            .await?;

        self.connection = Some(connection);
        self.channel = Some(channel);

        info!(
            "Connected to RabbitMQ, exchange '{}' declared with routing key '{}'",
            self.exchange, self.routing_key
        );

        Ok(())
    }

    /// Serializes the message wrapped in a MassTransit envelope.
    /// `message_id` must match the AMQP message id the payload is sent with.
    pub fn envelope(&self, message: ReleaseCalculatedMessage, message_id: Uuid) -> Result<Vec<u8>, PublisherError> {
        let envelope = MassTransitEnvelope {
            message_id: message_id.to_string(),
            conversation_id: Uuid::new_v4().to_string(),
            source_address: format!("rabbitmq://localhost/{}", self.exchange),
            destination_address: format!("rabbitmq://localhost/{}", self.routing_key),
            message_type: vec!["urn:message:Ratings.Messages:ReleaseCalculatedMessage".to_string()],
            message,
            sent_time: Utc::now()
        };

        Ok(serde_json::to_vec(&envelope)?)
    }

    pub async fn publish_release_calculated(&self, message: ReleaseCalculatedMessage) -> Result<(), PublisherError> {
        let channel = self.channel.as_ref().ok_or(PublisherError::NotInitialized)?;
        let release_date = message.release_date;
        let message_id = Uuid::new_v4();
        let payload = self.envelope(message, message_id)?;

        channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &payload,
                message_properties(message_id)
            )
            .await?;

        debug!(
            "Published release {} (message {}) to exchange '{}' with routing key '{}'",
            release_date, message_id, self.exchange, self.routing_key
        );

        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some() && self.channel.is_some()
    }

    pub async fn close(&mut self) -> Result<(), PublisherError> {
        if let Some(channel) = self.channel.take() {
            channel.close(200, "Normal shutdown").await?;
        }

        if let Some(connection) = self.connection.take() {
            if let Ok(conn) = Arc::try_unwrap(connection) {
                conn.close(200, "Normal shutdown").await?;
            }
        }

        info!("RabbitMQ connection closed");
        Ok(())
    }
}

/// AMQP properties of a MassTransit message sent with `message_id`
fn message_properties(message_id: Uuid) -> BasicProperties {
    let mut headers = BTreeMap::new();
    headers.insert(
        ShortString::from("Content-Type"),
        AMQPValue::LongString(LongString::from("application/vnd.masstransit+json"))
    );

    BasicProperties::default()
        .with_content_type("application/vnd.masstransit+json".into())
        .with_headers(FieldTable::from(headers))
        .with_message_id(message_id.to_string().into())
        .with_timestamp(Utc::now().timestamp() as u64)
}

impl Drop for RabbitMqPublisher {
    fn drop(&mut self) {
        if self.is_connected() {
            warn!("RabbitMQ publisher dropped without proper closure");
        }
    }
}

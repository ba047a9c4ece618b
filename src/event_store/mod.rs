// region:    --- Imports
use crate::error::{ServiceError, ServiceResult};
use crate::message_broker::KafkaProducer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, Transaction};
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

// region:    --- Event Model

/// Row shape of the append-only event log.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Event {
    pub id: i64,
    pub aggregate_id: i64,
    pub event_type: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub version: i64,
}

// endregion: --- Event Model

// region:    --- Event Store

/// Append-only audit log plus broker publication.
///
/// Versions are allocated per aggregate at insert time; the unique
/// `(aggregate_id, version)` index turns a concurrent allocation into a
/// `VersionConflict`. Appends that share a transaction with the lot row
/// update inherit its row lock and cannot conflict.
#[async_trait]
pub trait EventStore {
    /// Append inside the caller's transaction. Publish separately once
    /// the transaction has committed.
    async fn append_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: i64,
        event_type: &str,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> ServiceResult<Event>;

    /// Publish an already-durable event to the broker.
    async fn publish_event(&self, event: &Event) -> ServiceResult<()>;
}

pub struct PostgresEventStore {
    kafka_producer: Arc<KafkaProducer>,
}

impl PostgresEventStore {
    pub fn new(kafka_producer: Arc<KafkaProducer>) -> Self {
        Self { kafka_producer }
    }
}

const APPEND_EVENT: &str = "INSERT INTO events (aggregate_id, event_type, data, timestamp, version)
    VALUES ($1, $2, $3, $4,
            (SELECT COALESCE(MAX(version), 0) + 1 FROM events WHERE aggregate_id = $1))
    RETURNING id, aggregate_id, event_type, data, timestamp, version";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: i64,
        event_type: &str,
        data: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> ServiceResult<Event> {
        let event = sqlx::query_as::<_, Event>(APPEND_EVENT)
            .bind(aggregate_id)
            .bind(event_type)
            .bind(&data)
            .bind(timestamp)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ServiceError::VersionConflict
                } else {
                    ServiceError::Database(e)
                }
            })?;

        info!(
            "{:<12} --> appended {} v{} for aggregate {}",
            "EventStore", event.event_type, event.version, event.aggregate_id
        );
        Ok(event)
    }

    async fn publish_event(&self, event: &Event) -> ServiceResult<()> {
        self.kafka_producer
            .send_message(
                "auction-events",
                &event.id.to_string(),
                &serde_json::to_string(event)?,
            )
            .await
            .map_err(ServiceError::Broker)
    }
}

// endregion: --- Event Store

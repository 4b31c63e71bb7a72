//! Webhook record store.
//!
//! Push notifications are normalized and kept keyed by run handle until the
//! poll loop (or the UI) reads them. This is a best-effort cache with a
//! fixed retention window, not a durable queue: records are upserted on
//! receipt (redelivery overwrites, never duplicates) and evicted by the
//! store itself once the TTL elapses, whether or not they were consumed.
//!
//! The store is injected behind a trait so deployments can back it with
//! Redis instead of process memory without touching the lifecycle watcher.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::models::job::{JobStatus, MediaAsset};

/// Normalized webhook delivery for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRecord {
    pub run_id: String,
    pub status: JobStatus,
    #[serde(rename = "images", default)]
    pub assets: Vec<MediaAsset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Insert or overwrite the record for its run handle. Each call resets
    /// the retention window, so a redelivery extends the record's lifetime;
    /// acceptable for a best-effort cache.
    async fn upsert(&self, record: WebhookRecord) -> Result<(), StoreError>;

    /// Stored record, or `None` during the queued/running window. Absence
    /// is a normal state, never an error.
    async fn get(&self, run_id: &str) -> Result<Option<WebhookRecord>, StoreError>;
}

/// Process-local store: a map with TTL-on-write entries. Expired entries
/// are dropped lazily on read and swept on every write, which bounds the
/// map without a background task.
pub struct InMemoryWebhookStore {
    retention: Duration,
    records: RwLock<HashMap<String, (WebhookRecord, Instant)>>,
}

impl InMemoryWebhookStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            records: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn upsert(&self, record: WebhookRecord) -> Result<(), StoreError> {
        let expires_at = Instant::now() + self.retention;
        let mut records = self.records.write().await;
        records.retain(|_, (_, deadline)| *deadline > Instant::now());
        records.insert(record.run_id.clone(), (record, expires_at));
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<WebhookRecord>, StoreError> {
        {
            let records = self.records.read().await;
            match records.get(run_id) {
                None => return Ok(None),
                Some((record, deadline)) if *deadline > Instant::now() => {
                    return Ok(Some(record.clone()));
                }
                Some(_) => {}
            }
        }
        // Entry expired between write and read; drop it.
        self.records.write().await.remove(run_id);
        Ok(None)
    }
}

/// Redis-backed store; the TTL is enforced by Redis key expiry.
pub struct RedisWebhookStore {
    client: redis::Client,
    retention: Duration,
}

impl RedisWebhookStore {
    pub fn new(redis_url: &str, retention: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client, retention })
    }

    fn key(run_id: &str) -> String {
        format!("genrelay:webhook:{run_id}")
    }
}

#[async_trait]
impl WebhookStore for RedisWebhookStore {
    async fn upsert(&self, record: WebhookRecord) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(&record)?;
        conn.set_ex::<_, _, ()>(
            Self::key(&record.run_id),
            payload,
            self.retention.as_secs(),
        )
        .await?;
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<WebhookRecord>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(Self::key(run_id)).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(run_id: &str, status: JobStatus) -> WebhookRecord {
        WebhookRecord {
            run_id: run_id.to_string(),
            status,
            assets: Vec::new(),
            error: None,
        }
    }

    #[tokio::test]
    async fn absent_record_reads_as_none() {
        let store = InMemoryWebhookStore::new(Duration::from_secs(3600));
        assert_eq!(store.get("r1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn redelivery_upserts_a_single_record() {
        let store = InMemoryWebhookStore::new(Duration::from_secs(3600));
        let failed = record("r1", JobStatus::Failed);

        store.upsert(failed.clone()).await.unwrap();
        store.upsert(failed.clone()).await.unwrap();

        let stored = store.get("r1").await.unwrap().unwrap();
        assert_eq!(stored, failed);
    }

    #[tokio::test]
    async fn redelivery_overwrites_content() {
        let store = InMemoryWebhookStore::new(Duration::from_secs(3600));
        store.upsert(record("r1", JobStatus::Running)).await.unwrap();

        let mut done = record("r1", JobStatus::Completed);
        done.assets.push(MediaAsset {
            url: "https://cdn/x.png".to_string(),
            filename: "x.png".to_string(),
        });
        store.upsert(done.clone()).await.unwrap();

        assert_eq!(store.get("r1").await.unwrap(), Some(done));
    }

    #[tokio::test(start_paused = true)]
    async fn records_expire_after_retention() {
        let store = InMemoryWebhookStore::new(Duration::from_secs(10));
        store.upsert(record("r1", JobStatus::Completed)).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(store.get("r1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("r1").await.unwrap(), None);
    }
}

//! Persistence for channel configs and sync results.
//!
//! The store is the source of truth; the registry's adapters and histories
//! are rebuilt from it at startup.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::aggregates::{ChannelConfig, ChannelSyncResult, Credentials};
use crate::domain::value_objects::ChannelId;
use crate::{ChannelError, Result};

#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn list(&self) -> Result<Vec<ChannelConfig>>;
    async fn get(&self, id: ChannelId) -> Result<Option<ChannelConfig>>;
    /// Insert or replace by channel id.
    async fn save(&self, config: &ChannelConfig) -> Result<()>;
    async fn record_sync(&self, result: &ChannelSyncResult) -> Result<()>;
    /// Newest first.
    async fn recent_syncs(&self, id: ChannelId, limit: usize) -> Result<Vec<ChannelSyncResult>>;
}

// =============================================================================
// In-memory
// =============================================================================

/// Used when no database is configured, and in tests.
#[derive(Default)]
pub struct InMemoryChannelStore {
    channels: RwLock<BTreeMap<ChannelId, ChannelConfig>>,
    syncs: RwLock<Vec<ChannelSyncResult>>,
}

impl InMemoryChannelStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl ChannelStore for InMemoryChannelStore {
    async fn list(&self) -> Result<Vec<ChannelConfig>> {
        Ok(self.channels.read().await.values().cloned().collect())
    }

    async fn get(&self, id: ChannelId) -> Result<Option<ChannelConfig>> {
        Ok(self.channels.read().await.get(&id).cloned())
    }

    async fn save(&self, config: &ChannelConfig) -> Result<()> {
        self.channels.write().await.insert(config.id, config.clone());
        Ok(())
    }

    async fn record_sync(&self, result: &ChannelSyncResult) -> Result<()> {
        self.syncs.write().await.push(result.clone());
        Ok(())
    }

    async fn recent_syncs(&self, id: ChannelId, limit: usize) -> Result<Vec<ChannelSyncResult>> {
        let syncs = self.syncs.read().await;
        Ok(syncs.iter().rev().filter(|r| r.channel_id == id).take(limit).cloned().collect())
    }
}

// =============================================================================
// Postgres
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ChannelRow {
    channel_id: String,
    name: String,
    description: Option<String>,
    status: String,
    credentials: Json<Credentials>,
    last_sync: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl TryFrom<ChannelRow> for ChannelConfig {
    type Error = ChannelError;
    fn try_from(row: ChannelRow) -> Result<Self> {
        Ok(ChannelConfig {
            id: row.channel_id.parse()?,
            name: row.name,
            description: row.description,
            status: row.status.parse().map_err(ChannelError::StorageError)?,
            last_sync: row.last_sync,
            last_error: row.last_error,
            credentials: row.credentials.0,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SyncRow {
    id: Uuid,
    channel_id: String,
    sync_type: String,
    success: bool,
    processed_count: i32,
    error_count: i32,
    errors: Option<Json<Vec<String>>>,
    synced_at: DateTime<Utc>,
}

impl TryFrom<SyncRow> for ChannelSyncResult {
    type Error = ChannelError;
    fn try_from(row: SyncRow) -> Result<Self> {
        Ok(ChannelSyncResult {
            id: row.id,
            channel_id: row.channel_id.parse()?,
            sync_type: row.sync_type.parse().map_err(ChannelError::StorageError)?,
            success: row.success,
            processed_count: row.processed_count.max(0) as u32,
            error_count: row.error_count.max(0) as u32,
            errors: row.errors.map(|e| e.0),
            last_sync_time: row.synced_at,
        })
    }
}

pub struct PgChannelStore {
    db: PgPool,
}

impl PgChannelStore {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

const CHANNEL_COLUMNS: &str = "channel_id, name, description, status, credentials, last_sync, last_error";

#[async_trait]
impl ChannelStore for PgChannelStore {
    async fn list(&self) -> Result<Vec<ChannelConfig>> {
        let rows = sqlx::query_as::<_, ChannelRow>(&format!("SELECT {CHANNEL_COLUMNS} FROM channels ORDER BY channel_id"))
            .fetch_all(&self.db).await?;
        rows.into_iter().map(ChannelConfig::try_from).collect()
    }

    async fn get(&self, id: ChannelId) -> Result<Option<ChannelConfig>> {
        sqlx::query_as::<_, ChannelRow>(&format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE channel_id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.db).await?
            .map(ChannelConfig::try_from)
            .transpose()
    }

    async fn save(&self, config: &ChannelConfig) -> Result<()> {
        sqlx::query("INSERT INTO channels (channel_id, name, description, status, credentials, last_sync, last_error, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW()) ON CONFLICT (channel_id) DO UPDATE SET name = EXCLUDED.name, description = EXCLUDED.description, status = EXCLUDED.status, credentials = EXCLUDED.credentials, last_sync = EXCLUDED.last_sync, last_error = EXCLUDED.last_error, updated_at = NOW()")
            .bind(config.id.as_str()).bind(&config.name).bind(&config.description).bind(config.status.as_str())
            .bind(Json(&config.credentials)).bind(config.last_sync).bind(&config.last_error)
            .execute(&self.db).await?;
        Ok(())
    }

    async fn record_sync(&self, result: &ChannelSyncResult) -> Result<()> {
        sqlx::query("INSERT INTO channel_sync_results (id, channel_id, sync_type, success, processed_count, error_count, errors, synced_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(result.id).bind(result.channel_id.as_str()).bind(result.sync_type.as_str()).bind(result.success)
            .bind(result.processed_count as i32).bind(result.error_count as i32)
            .bind(result.errors.as_ref().map(Json)).bind(result.last_sync_time)
            .execute(&self.db).await?;
        Ok(())
    }

    async fn recent_syncs(&self, id: ChannelId, limit: usize) -> Result<Vec<ChannelSyncResult>> {
        let rows = sqlx::query_as::<_, SyncRow>("SELECT id, channel_id, sync_type, success, processed_count, error_count, errors, synced_at FROM channel_sync_results WHERE channel_id = $1 ORDER BY synced_at DESC LIMIT $2")
            .bind(id.as_str()).bind(limit as i64)
            .fetch_all(&self.db).await?;
        rows.into_iter().map(ChannelSyncResult::try_from).collect()
    }
}

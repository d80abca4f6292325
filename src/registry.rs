//! Registry of channel adapters and the fan-out operations over them.
//!
//! Bulk operations spawn one task per registered channel and wait for all of
//! them. A channel whose task fails only loses its own slot in the result map.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::adapters::{self, ChannelAdapter, ChannelHttp};
use crate::domain::aggregates::{ChannelConfig, ChannelConfigPatch, ChannelSyncResult, SyncHistory};
use crate::domain::value_objects::{ChannelId, ChannelStatus, SyncType};
use crate::Result;

/// Per-channel summary derived from the adapter's config and its sync history.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub channel_id: ChannelId,
    pub status: ChannelStatus,
    pub total_products: u32,
    pub total_orders: u32,
    pub successful_syncs: u32,
    pub failed_syncs: u32,
    pub last_sync: Option<DateTime<Utc>>,
}

pub struct ChannelRegistry {
    http: ChannelHttp,
    adapters: RwLock<HashMap<ChannelId, Arc<dyn ChannelAdapter>>>,
    history: Mutex<HashMap<ChannelId, SyncHistory>>,
}

impl ChannelRegistry {
    pub fn new(http: ChannelHttp) -> Self {
        Self { http, adapters: RwLock::new(HashMap::new()), history: Mutex::new(HashMap::new()) }
    }

    /// Builds and stores the adapter for `config.id`, replacing any previous one.
    /// Channels without an adapter are logged and left out.
    pub async fn register_channel(&self, config: ChannelConfig) -> Result<ChannelId> {
        let name = config.name.clone();
        match adapters::build(config, self.http.clone()) {
            Ok(adapter) => {
                let id = adapter.channel_id();
                self.register_adapter(adapter).await;
                tracing::info!(channel = %id, name = %name, "channel registered");
                Ok(id)
            }
            Err(e) => {
                tracing::warn!(name = %name, error = %e, "channel not registered");
                Err(e)
            }
        }
    }

    pub async fn register_adapter(&self, adapter: Arc<dyn ChannelAdapter>) {
        self.adapters.write().await.insert(adapter.channel_id(), adapter);
    }

    pub async fn unregister_channel(&self, id: ChannelId) -> bool {
        let removed = self.adapters.write().await.remove(&id).is_some();
        if removed {
            tracing::info!(channel = %id, "channel unregistered");
        }
        removed
    }

    pub async fn get_channel_service(&self, id: ChannelId) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters.read().await.get(&id).cloned()
    }

    pub async fn get_all_channels(&self) -> Vec<Arc<dyn ChannelAdapter>> {
        let mut all: Vec<_> = self.adapters.read().await.values().cloned().collect();
        all.sort_by_key(|a| a.channel_id());
        all
    }

    pub async fn update_channel_config(&self, id: ChannelId, patch: &ChannelConfigPatch) -> bool {
        match self.get_channel_service(id).await {
            Some(adapter) => {
                adapter.update_config(patch).await;
                true
            }
            None => false,
        }
    }

    pub async fn test_all_connections(&self) -> HashMap<ChannelId, bool> {
        self.fan_out(
            |adapter| async move { adapter.test_connection().await },
            |_, _| false,
        ).await
    }

    pub async fn sync_all_products(&self) -> HashMap<ChannelId, ChannelSyncResult> {
        self.sync_all(SyncType::Products).await
    }

    pub async fn sync_all_orders(&self) -> HashMap<ChannelId, ChannelSyncResult> {
        self.sync_all(SyncType::Orders).await
    }

    pub async fn update_inventory_all_channels(&self, product_id: &str, stock: u32) -> HashMap<ChannelId, bool> {
        let product_id: Arc<str> = Arc::from(product_id);
        self.fan_out(
            move |adapter| {
                let product_id = Arc::clone(&product_id);
                async move { adapter.update_inventory(&product_id, stock).await }
            },
            |_, _| false,
        ).await
    }

    /// Runs one sync against one channel and records the outcome.
    pub async fn sync_channel(&self, id: ChannelId, sync_type: SyncType) -> Option<ChannelSyncResult> {
        let adapter = self.get_channel_service(id).await?;
        let result = run_sync(adapter, sync_type).await;
        self.record(result.clone()).await;
        Some(result)
    }

    /// Most recent results first, at most ten.
    pub async fn get_sync_history(&self, id: ChannelId) -> Vec<ChannelSyncResult> {
        self.history.lock().await.get(&id).map(SyncHistory::to_vec).unwrap_or_default()
    }

    pub async fn get_channel_stats(&self) -> BTreeMap<ChannelId, ChannelStats> {
        let mut configs = Vec::new();
        for adapter in self.get_all_channels().await {
            configs.push(adapter.config().await);
        }
        let history = self.history.lock().await;
        let mut stats = BTreeMap::new();
        for config in configs {
            let entries = history.get(&config.id);
            let latest = |sync_type| entries.and_then(|h| h.latest_success(sync_type)).map_or(0, |r| r.processed_count);
            let (ok, failed) = entries.map_or((0, 0), |h| {
                h.iter().fold((0, 0), |(ok, failed), r| if r.success { (ok + 1, failed) } else { (ok, failed + 1) })
            });
            stats.insert(config.id, ChannelStats {
                channel_id: config.id,
                status: config.status,
                total_products: latest(SyncType::Products),
                total_orders: latest(SyncType::Orders),
                successful_syncs: ok,
                failed_syncs: failed,
                last_sync: config.last_sync,
            });
        }
        stats
    }

    pub(crate) async fn record(&self, result: ChannelSyncResult) {
        self.history.lock().await.entry(result.channel_id).or_insert_with(SyncHistory::new).record(result);
    }

    async fn sync_all(&self, sync_type: SyncType) -> HashMap<ChannelId, ChannelSyncResult> {
        let results = self.fan_out(
            move |adapter| run_sync(adapter, sync_type),
            move |id, reason| ChannelSyncResult::failed(id, sync_type, reason),
        ).await;
        for result in results.values() {
            self.record(result.clone()).await;
        }
        results
    }

    /// Spawns `op` for every registered adapter and collects every outcome.
    /// A task that panics is reported through `on_failure`.
    async fn fan_out<T, F, Fut>(&self, op: F, on_failure: impl Fn(ChannelId, String) -> T) -> HashMap<ChannelId, T>
    where
        F: Fn(Arc<dyn ChannelAdapter>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let adapters: Vec<_> = self.adapters.read().await.iter().map(|(id, a)| (*id, Arc::clone(a))).collect();
        let (ids, handles): (Vec<_>, Vec<_>) = adapters
            .into_iter()
            .map(|(id, adapter)| (id, tokio::spawn(op(adapter))))
            .unzip();

        let outcomes = futures::future::join_all(handles).await;
        ids.into_iter()
            .zip(outcomes)
            .map(|(id, outcome)| match outcome {
                Ok(value) => (id, value),
                Err(e) => {
                    tracing::error!(channel = %id, error = %e, "channel task failed");
                    (id, on_failure(id, e.to_string()))
                }
            })
            .collect()
    }
}

async fn run_sync(adapter: Arc<dyn ChannelAdapter>, sync_type: SyncType) -> ChannelSyncResult {
    match sync_type {
        SyncType::Products => adapter.sync_products().await,
        SyncType::Orders => adapter.sync_orders().await,
        SyncType::Inventory => ChannelSyncResult::failed(
            adapter.channel_id(),
            SyncType::Inventory,
            "inventory is pushed per product, not pulled",
        ),
    }
}

//! Channel service: the persistent front of the registry.
//!
//! Every operation that can change a channel's status, last sync time or last
//! error writes the adapter's config back to the [`ChannelStore`], and every
//! sync result is stored as well. Store writes for one channel are serialized,
//! and a write from an adapter that has since been replaced is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use validator::Validate;

use crate::adapters::{self, AuthorizationRequest, ChannelAdapter};
use crate::domain::aggregates::{default_channels, ChannelConfig, ChannelConfigPatch, ChannelSyncResult, SYNC_HISTORY_LIMIT};
use crate::domain::events::ChannelEvent;
use crate::domain::value_objects::{ChannelId, ChannelStatus, SyncType};
use crate::publisher::EventPublisher;
use crate::registry::{ChannelRegistry, ChannelStats};
use crate::store::ChannelStore;
use crate::{ChannelError, Result};

/// Outcome of a single connection test.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TestOutcome {
    pub success: bool,
    pub message: String,
}

pub struct ChannelService {
    store: Arc<dyn ChannelStore>,
    registry: Arc<ChannelRegistry>,
    publisher: EventPublisher,
    redirect_uri: String,
    /// One per channel, indexed by [`ChannelId`] discriminant.
    write_locks: [Mutex<()>; ChannelId::ALL.len()],
}

impl ChannelService {
    pub fn new(store: Arc<dyn ChannelStore>, registry: Arc<ChannelRegistry>, publisher: EventPublisher, redirect_uri: impl Into<String>) -> Self {
        Self {
            store,
            registry,
            publisher,
            redirect_uri: redirect_uri.into(),
            write_locks: std::array::from_fn(|_| Mutex::new(())),
        }
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> { &self.registry }

    /// Seeds the default channels that are not stored yet, then registers an
    /// adapter for every supported channel and reloads its recent history.
    pub async fn initialize_default_channels(&self) -> Result<()> {
        let stored = self.store.list().await?;
        for config in default_channels() {
            if !stored.iter().any(|c| c.id == config.id) {
                tracing::info!(channel = %config.id, "seeding default channel");
                self.store.save(&config).await?;
            }
        }

        for config in self.store.list().await? {
            if !adapters::supports(config.id) {
                continue;
            }
            let id = self.registry.register_channel(config).await?;
            let recent = self.store.recent_syncs(id, SYNC_HISTORY_LIMIT).await?;
            for result in recent.into_iter().rev() {
                self.registry.record(result).await;
            }
        }
        Ok(())
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelConfig>> {
        let mut configs = self.store.list().await?;
        configs.sort_by_key(|c| c.id);
        Ok(configs)
    }

    pub async fn get_channel(&self, id: ChannelId) -> Result<ChannelConfig> {
        self.store.get(id).await?.ok_or(ChannelError::NotFound(id))
    }

    /// Validates and merges `patch`, settles the status, persists, and
    /// rebuilds the adapter from the saved config.
    pub async fn update_config(&self, id: ChannelId, patch: &ChannelConfigPatch) -> Result<ChannelConfig> {
        patch.validate()?;
        let config = {
            let _guard = self.write_lock(id).lock().await;
            let mut config = self.get_channel(id).await?;
            config.apply(patch);
            config.settle_after_save();
            self.store.save(&config).await?;
            if adapters::supports(id) {
                self.registry.register_channel(config.clone()).await?;
            }
            config
        };
        tracing::info!(channel = %id, status = config.status.as_str(), "channel configuration saved");
        self.publisher.publish(ChannelEvent::Configured { channel_id: id, complete: config.has_required_fields() }).await;
        Ok(config)
    }

    /// Tests one channel. Incomplete configs are rejected before the adapter is called.
    pub async fn test_connection(&self, id: ChannelId) -> Result<TestOutcome> {
        let config = self.get_channel(id).await?;
        let missing = config.missing_fields();
        if !missing.is_empty() {
            return Err(ChannelError::IncompleteConfig { id, missing: missing.join(", ") });
        }
        let adapter = self.adapter(id).await?;
        let success = adapter.test_connection().await;
        let config = self.persist(&adapter).await?;
        self.publish_connection(&config, success).await;

        let message = if success {
            "Connection successful".to_string()
        } else {
            config.last_error.unwrap_or_else(|| "Connection failed".to_string())
        };
        Ok(TestOutcome { success, message })
    }

    pub async fn sync_orders(&self, id: ChannelId) -> Result<ChannelSyncResult> {
        self.sync(id, SyncType::Orders).await
    }

    pub async fn sync_products(&self, id: ChannelId) -> Result<ChannelSyncResult> {
        self.sync(id, SyncType::Products).await
    }

    pub async fn test_all(&self) -> Result<HashMap<ChannelId, bool>> {
        let results = self.registry.test_all_connections().await;
        for (id, success) in &results {
            let config = self.persist_by_id(*id).await?;
            self.publish_connection(&config, *success).await;
        }
        Ok(results)
    }

    pub async fn sync_all_orders(&self) -> Result<HashMap<ChannelId, ChannelSyncResult>> {
        let results = self.registry.sync_all_orders().await;
        self.persist_sync_results(&results).await?;
        Ok(results)
    }

    pub async fn sync_all_products(&self) -> Result<HashMap<ChannelId, ChannelSyncResult>> {
        let results = self.registry.sync_all_products().await;
        self.persist_sync_results(&results).await?;
        Ok(results)
    }

    /// Pushes a stock level for one product to every registered channel.
    pub async fn push_inventory(&self, product_id: &str, stock: u32) -> Result<HashMap<ChannelId, bool>> {
        let results = self.registry.update_inventory_all_channels(product_id, stock).await;
        for (id, success) in &results {
            self.persist_by_id(*id).await?;
            self.publisher.publish(ChannelEvent::InventoryPushed {
                channel_id: *id,
                product_id: product_id.to_string(),
                stock,
                success: *success,
            }).await;
        }
        let pushed = results.values().filter(|ok| **ok).count();
        tracing::info!(product_id, stock, pushed, channels = results.len(), "inventory pushed");
        Ok(results)
    }

    pub async fn history(&self, id: ChannelId) -> Result<Vec<ChannelSyncResult>> {
        self.get_channel(id).await?;
        Ok(self.registry.get_sync_history(id).await)
    }

    pub async fn stats(&self) -> BTreeMap<ChannelId, ChannelStats> {
        self.registry.get_channel_stats().await
    }

    /// Starts the Naver consent flow.
    pub async fn naver_authorization_url(&self) -> Result<AuthorizationRequest> {
        let adapter = self.adapter(ChannelId::Naver).await?;
        let oauth = adapter.oauth().ok_or(ChannelError::Unsupported(ChannelId::Naver))?;
        oauth.authorization_url(&self.redirect_uri).await
    }

    /// Completes the Naver consent flow and persists the issued tokens.
    pub async fn complete_naver_oauth(&self, code: &str, state: &str) -> Result<ChannelConfig> {
        let adapter = self.adapter(ChannelId::Naver).await?;
        let oauth = adapter.oauth().ok_or(ChannelError::Unsupported(ChannelId::Naver))?;
        let outcome = oauth.exchange_code(code, state).await;
        let config = self.persist(&adapter).await?;
        outcome?;
        self.publisher.publish(ChannelEvent::Connected { channel_id: ChannelId::Naver }).await;
        Ok(config)
    }

    pub async fn refresh_naver_token(&self) -> Result<bool> {
        let adapter = self.adapter(ChannelId::Naver).await?;
        let oauth = adapter.oauth().ok_or(ChannelError::Unsupported(ChannelId::Naver))?;
        let refreshed = oauth.refresh_token().await;
        self.persist(&adapter).await?;
        Ok(refreshed)
    }

    pub async fn product_pricing(&self, id: ChannelId, product_id: &str) -> Result<Value> {
        let adapter = self.adapter(id).await?;
        let pricing = adapter.pricing().ok_or(ChannelError::Unsupported(id))?;
        pricing.product_pricing(product_id).await
    }

    pub async fn update_product_price(&self, id: ChannelId, product_id: &str, price: u64) -> Result<bool> {
        let adapter = self.adapter(id).await?;
        let pricing = adapter.pricing().ok_or(ChannelError::Unsupported(id))?;
        let updated = pricing.update_product_price(product_id, price).await;
        self.persist(&adapter).await?;
        Ok(updated)
    }

    async fn sync(&self, id: ChannelId, sync_type: SyncType) -> Result<ChannelSyncResult> {
        let config = self.get_channel(id).await?;
        if config.status != ChannelStatus::Connected {
            return Err(ChannelError::NotConnected(id));
        }
        let result = self.registry.sync_channel(id, sync_type).await.ok_or(ChannelError::Unsupported(id))?;
        self.persist_by_id(id).await?;
        self.store.record_sync(&result).await?;
        self.publish_sync(&result).await;
        Ok(result)
    }

    async fn adapter(&self, id: ChannelId) -> Result<Arc<dyn ChannelAdapter>> {
        self.registry.get_channel_service(id).await.ok_or(ChannelError::Unsupported(id))
    }

    fn write_lock(&self, id: ChannelId) -> &Mutex<()> {
        &self.write_locks[id as usize]
    }

    /// Writes the adapter's current config to the store, unless the registry
    /// has replaced the adapter since it was fetched. Returns the adapter's
    /// config either way.
    async fn persist(&self, adapter: &Arc<dyn ChannelAdapter>) -> Result<ChannelConfig> {
        let id = adapter.channel_id();
        let _guard = self.write_lock(id).lock().await;
        let config = adapter.config().await;
        let current = self.registry.get_channel_service(id).await;
        if current.is_some_and(|current| Arc::ptr_eq(&current, adapter)) {
            self.store.save(&config).await?;
        } else {
            tracing::info!(channel = %id, "adapter replaced during the call, result not persisted");
        }
        Ok(config)
    }

    async fn persist_by_id(&self, id: ChannelId) -> Result<ChannelConfig> {
        let adapter = self.adapter(id).await?;
        self.persist(&adapter).await
    }

    async fn persist_sync_results(&self, results: &HashMap<ChannelId, ChannelSyncResult>) -> Result<()> {
        for (id, result) in results {
            self.persist_by_id(*id).await?;
            self.store.record_sync(result).await?;
            self.publish_sync(result).await;
        }
        Ok(())
    }

    async fn publish_connection(&self, config: &ChannelConfig, success: bool) {
        let event = if success {
            ChannelEvent::Connected { channel_id: config.id }
        } else {
            ChannelEvent::ConnectionFailed { channel_id: config.id, reason: config.last_error.clone() }
        };
        self.publisher.publish(event).await;
    }

    async fn publish_sync(&self, result: &ChannelSyncResult) {
        self.publisher.publish(ChannelEvent::SyncCompleted {
            channel_id: result.channel_id,
            sync_type: result.sync_type,
            success: result.success,
            processed_count: result.processed_count,
        }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ChannelHttp;
    use crate::config::{Endpoints, Timeouts};
    use crate::store::InMemoryChannelStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use mockito::Matcher;
    use serde_json::json;
    use tokio::sync::Notify;

    const COUPANG_ROOT: &str = "/v2/providers/seller_api/apis/api/v1/marketplace";

    async fn service(base: &str) -> (ChannelService, Arc<InMemoryChannelStore>) {
        let store = Arc::new(InMemoryChannelStore::new());
        let http = ChannelHttp::new(Endpoints::all(base), Timeouts::default()).unwrap();
        let registry = Arc::new(ChannelRegistry::new(http));
        let service = ChannelService::new(store.clone(), registry, EventPublisher::disabled(), "http://localhost/callback");
        service.initialize_default_channels().await.unwrap();
        (service, store)
    }

    fn coupang_patch() -> ChannelConfigPatch {
        ChannelConfigPatch {
            access_key: Some("AK".into()),
            secret_key: Some("SK".into()),
            vendor_id: Some("A0001".into()),
            ..Default::default()
        }
    }

    /// Coupang stand-in whose connection test blocks until released.
    struct GatedAdapter {
        config: std::sync::Mutex<ChannelConfig>,
        started: Notify,
        release: Notify,
    }

    impl GatedAdapter {
        fn new(config: ChannelConfig) -> Arc<Self> {
            Arc::new(Self { config: std::sync::Mutex::new(config), started: Notify::new(), release: Notify::new() })
        }
    }

    #[async_trait]
    impl ChannelAdapter for GatedAdapter {
        fn channel_id(&self) -> ChannelId { ChannelId::Coupang }
        async fn config(&self) -> ChannelConfig { self.config.lock().unwrap().clone() }
        async fn update_config(&self, patch: &ChannelConfigPatch) { self.config.lock().unwrap().apply(patch); }
        async fn authenticate(&self) -> bool { self.test_connection().await }
        async fn test_connection(&self) -> bool {
            self.started.notify_one();
            self.release.notified().await;
            self.config.lock().unwrap().mark_connected(Utc::now())
        }
        async fn sync_products(&self) -> ChannelSyncResult {
            ChannelSyncResult::succeeded(ChannelId::Coupang, SyncType::Products, 0)
        }
        async fn sync_orders(&self) -> ChannelSyncResult {
            ChannelSyncResult::succeeded(ChannelId::Coupang, SyncType::Orders, 0)
        }
        async fn update_inventory(&self, _product_id: &str, _stock: u32) -> bool { false }
    }

    #[tokio::test]
    async fn test_initialize_seeds_and_registers() {
        let (service, store) = service("http://127.0.0.1:9").await;
        assert_eq!(service.list_channels().await.unwrap().len(), 8);
        let registered: Vec<_> = service.registry().get_all_channels().await.iter().map(|a| a.channel_id()).collect();
        assert_eq!(registered, vec![ChannelId::Naver, ChannelId::Coupang]);

        // a second start keeps stored changes
        let mut coupang = store.get(ChannelId::Coupang).await.unwrap().unwrap();
        coupang.name = "Coupang Wing".into();
        store.save(&coupang).await.unwrap();
        service.initialize_default_channels().await.unwrap();
        assert_eq!(service.get_channel(ChannelId::Coupang).await.unwrap().name, "Coupang Wing");
    }

    #[tokio::test]
    async fn test_incomplete_config_rejected_before_network() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", Matcher::Any).expect(0).create_async().await;
        let (service, _) = service(&server.url()).await;

        let err = service.test_connection(ChannelId::Coupang).await.unwrap_err();
        assert!(matches!(err, ChannelError::IncompleteConfig { id: ChannelId::Coupang, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_config_moves_to_pending() {
        let (service, store) = service("http://127.0.0.1:9").await;
        let partial = ChannelConfigPatch { access_key: Some("AK".into()), ..Default::default() };
        let saved = service.update_config(ChannelId::Coupang, &partial).await.unwrap();
        assert_eq!(saved.status, ChannelStatus::Disconnected);

        let saved = service.update_config(ChannelId::Coupang, &coupang_patch()).await.unwrap();
        assert_eq!(saved.status, ChannelStatus::Pending);
        assert_eq!(store.get(ChannelId::Coupang).await.unwrap().unwrap().status, ChannelStatus::Pending);
        let adapter = service.registry().get_channel_service(ChannelId::Coupang).await.unwrap();
        assert_eq!(adapter.config().await.api_key().unwrap().vendor_id, "A0001");
    }

    #[tokio::test]
    async fn test_update_config_rejects_invalid_webhook_url() {
        let (service, _) = service("http://127.0.0.1:9").await;
        let patch = ChannelConfigPatch { webhook_url: Some("not a url".into()), ..Default::default() };
        let err = service.update_config(ChannelId::Ohouse, &patch).await.unwrap_err();
        assert!(matches!(err, ChannelError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unsupported_channel_is_configurable_but_not_testable() {
        let (service, _) = service("http://127.0.0.1:9").await;
        let patch = ChannelConfigPatch { webhook_url: Some("https://hooks.example.com/29cm".into()), ..Default::default() };
        let saved = service.update_config(ChannelId::TwentyNineCm, &patch).await.unwrap();
        assert_eq!(saved.status, ChannelStatus::Pending);
        let err = service.test_connection(ChannelId::TwentyNineCm).await.unwrap_err();
        assert!(matches!(err, ChannelError::Unsupported(ChannelId::TwentyNineCm)));
    }

    #[tokio::test]
    async fn test_sync_requires_connected_channel() {
        let (service, _) = service("http://127.0.0.1:9").await;
        service.update_config(ChannelId::Coupang, &coupang_patch()).await.unwrap();
        let err = service.sync_orders(ChannelId::Coupang).await.unwrap_err();
        assert!(matches!(err, ChannelError::NotConnected(ChannelId::Coupang)));
    }

    #[tokio::test]
    async fn test_connect_then_sync_persists_everything() {
        let mut server = mockito::Server::new_async().await;
        let _seller = server
            .mock("GET", format!("{COUPANG_ROOT}/seller-info").as_str())
            .with_status(200)
            .with_body(json!({"code": "SUCCESS", "data": {}}).to_string())
            .create_async()
            .await;
        let _orders = server
            .mock("GET", format!("{COUPANG_ROOT}/orders").as_str())
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"code": "SUCCESS", "data": {"content": [{"orderId": 1}, {"orderId": 2}, {"orderId": 3}]}}).to_string())
            .create_async()
            .await;
        let (service, store) = service(&server.url()).await;
        service.update_config(ChannelId::Coupang, &coupang_patch()).await.unwrap();

        let outcome = service.test_connection(ChannelId::Coupang).await.unwrap();
        assert_eq!(outcome, TestOutcome { success: true, message: "Connection successful".into() });
        let stored = store.get(ChannelId::Coupang).await.unwrap().unwrap();
        assert_eq!(stored.status, ChannelStatus::Connected);
        assert!(stored.last_sync.is_some());

        let result = service.sync_orders(ChannelId::Coupang).await.unwrap();
        assert!(result.success);
        assert_eq!(result.processed_count, 3);
        assert_eq!(store.recent_syncs(ChannelId::Coupang, 10).await.unwrap(), vec![result.clone()]);
        assert_eq!(service.history(ChannelId::Coupang).await.unwrap(), vec![result]);
        assert_eq!(service.stats().await[&ChannelId::Coupang].total_orders, 3);
    }

    #[tokio::test]
    async fn test_failed_connection_persists_error() {
        let mut server = mockito::Server::new_async().await;
        let _seller = server
            .mock("GET", format!("{COUPANG_ROOT}/seller-info").as_str())
            .with_status(401)
            .with_body("invalid signature")
            .create_async()
            .await;
        let (service, store) = service(&server.url()).await;
        service.update_config(ChannelId::Coupang, &coupang_patch()).await.unwrap();

        let outcome = service.test_connection(ChannelId::Coupang).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "HTTP 401: invalid signature");
        let stored = store.get(ChannelId::Coupang).await.unwrap().unwrap();
        assert_eq!(stored.status, ChannelStatus::Error);
        assert_eq!(stored.last_error.as_deref(), Some("HTTP 401: invalid signature"));
    }

    #[tokio::test]
    async fn test_history_reloaded_on_startup() {
        let store = Arc::new(InMemoryChannelStore::new());
        for n in 0..12 {
            store.record_sync(&ChannelSyncResult::succeeded(ChannelId::Coupang, SyncType::Products, n)).await.unwrap();
        }
        let http = ChannelHttp::new(Endpoints::default(), Timeouts::default()).unwrap();
        let service = ChannelService::new(store, Arc::new(ChannelRegistry::new(http)), EventPublisher::disabled(), "");
        service.initialize_default_channels().await.unwrap();

        let history = service.history(ChannelId::Coupang).await.unwrap();
        assert_eq!(history.len(), SYNC_HISTORY_LIMIT);
        assert_eq!(history[0].processed_count, 11);
        assert_eq!(history[9].processed_count, 2);
    }

    #[tokio::test]
    async fn test_naver_oauth_round_trip_persists_tokens() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/oauth2.0/token")
            .match_body(Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()))
            .with_status(200)
            .with_body(json!({"access_token": "AT", "refresh_token": "RT", "token_type": "bearer"}).to_string())
            .create_async()
            .await;
        let (service, store) = service(&server.url()).await;
        let patch = ChannelConfigPatch { client_id: Some("cid".into()), client_secret: Some("secret".into()), ..Default::default() };
        service.update_config(ChannelId::Naver, &patch).await.unwrap();

        let request = service.naver_authorization_url().await.unwrap();
        assert!(request.url.contains("redirect_uri=http%3A%2F%2Flocalhost%2Fcallback"));
        assert!(matches!(
            service.complete_naver_oauth("code", "forged").await,
            Err(ChannelError::StateMismatch)
        ));

        let request = service.naver_authorization_url().await.unwrap();
        let config = service.complete_naver_oauth("code", &request.state).await.unwrap();
        assert_eq!(config.status, ChannelStatus::Connected);
        let stored = store.get(ChannelId::Naver).await.unwrap().unwrap();
        assert_eq!(stored.oauth().unwrap().access_token.as_deref(), Some("AT"));
        assert_eq!(stored.oauth().unwrap().refresh_token.as_deref(), Some("RT"));
    }

    #[tokio::test]
    async fn test_push_inventory_persists_failures() {
        let mut server = mockito::Server::new_async().await;
        let _stock = server
            .mock("PUT", format!("{COUPANG_ROOT}/vendor-items/P-1/prices/quantity").as_str())
            .match_body(Matcher::Json(json!({"quantity": 7})))
            .with_status(200)
            .with_body(json!({"code": "SUCCESS"}).to_string())
            .create_async()
            .await;
        let (service, store) = service(&server.url()).await;
        service.update_config(ChannelId::Coupang, &coupang_patch()).await.unwrap();

        let results = service.push_inventory("P-1", 7).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[&ChannelId::Coupang]);
        // naver has no client credentials yet
        assert!(!results[&ChannelId::Naver]);
        assert_eq!(store.get(ChannelId::Naver).await.unwrap().unwrap().status, ChannelStatus::Error);
    }

    #[tokio::test]
    async fn test_pricing_only_on_coupang() {
        let (service, _) = service("http://127.0.0.1:9").await;
        let err = service.update_product_price(ChannelId::Naver, "1", 100).await.unwrap_err();
        assert!(matches!(err, ChannelError::Unsupported(ChannelId::Naver)));
    }

    #[tokio::test]
    async fn test_config_saved_during_connection_test_is_kept() {
        let (service, store) = service("http://127.0.0.1:9").await;
        service.update_config(ChannelId::Coupang, &coupang_patch()).await.unwrap();
        let gated = GatedAdapter::new(store.get(ChannelId::Coupang).await.unwrap().unwrap());
        service.registry().register_adapter(gated.clone()).await;
        let service = Arc::new(service);

        let testing = tokio::spawn({
            let service = Arc::clone(&service);
            async move { service.test_connection(ChannelId::Coupang).await }
        });
        gated.started.notified().await;
        let patch = ChannelConfigPatch { access_key: Some("AK2".into()), ..Default::default() };
        service.update_config(ChannelId::Coupang, &patch).await.unwrap();
        gated.release.notify_one();

        let outcome = testing.await.unwrap().unwrap();
        assert!(outcome.success);
        let stored = store.get(ChannelId::Coupang).await.unwrap().unwrap();
        assert_eq!(stored.api_key().unwrap().access_key, "AK2");
        assert_eq!(stored.status, ChannelStatus::Pending);
        let live = service.registry().get_channel_service(ChannelId::Coupang).await.unwrap().config().await;
        assert_eq!(live, stored);
    }
}

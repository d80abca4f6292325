//! Marketplace adapters.
//!
//! Each supported marketplace implements [`ChannelAdapter`]. Trait methods
//! never return errors: failures are logged, recorded on the channel config
//! (`status = error`, `last_error`) and reported as `false` or a failed
//! [`ChannelSyncResult`]. Adapters that use OAuth additionally expose
//! [`OAuthAdapter`] through [`ChannelAdapter::oauth`], and marketplaces with
//! price management expose [`PricingAdapter`].

pub mod coupang;
pub mod http;
pub mod naver;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::aggregates::{ChannelConfig, ChannelConfigPatch, ChannelSyncResult};
use crate::domain::value_objects::{ChannelId, SyncType};
use crate::{ChannelError, Result};

pub use coupang::CoupangAdapter;
pub use http::{CallClass, ChannelHttp};
pub use naver::NaverAdapter;

#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    async fn config(&self) -> ChannelConfig;

    async fn channel_name(&self) -> String {
        self.config().await.name
    }

    /// Partial merge into the adapter's config.
    async fn update_config(&self, patch: &ChannelConfigPatch);

    async fn authenticate(&self) -> bool;

    async fn test_connection(&self) -> bool;

    async fn sync_products(&self) -> ChannelSyncResult;

    async fn sync_orders(&self) -> ChannelSyncResult;

    async fn update_inventory(&self, product_id: &str, stock: u32) -> bool;

    /// OAuth capabilities, for adapters that authenticate that way.
    fn oauth(&self) -> Option<&dyn OAuthAdapter> {
        None
    }

    /// Price management, for marketplaces that expose it.
    fn pricing(&self) -> Option<&dyn PricingAdapter> {
        None
    }
}

/// Authorization request handed to the seller's browser.
#[derive(Clone, Debug, serde::Serialize)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

#[async_trait]
pub trait OAuthAdapter: Send + Sync {
    /// Builds the consent URL and remembers the `state` it carries.
    async fn authorization_url(&self, redirect_uri: &str) -> Result<AuthorizationRequest>;

    /// Completes the authorization-code exchange and stores the token pair.
    async fn exchange_code(&self, code: &str, state: &str) -> Result<()>;

    /// Swaps the stored refresh token for a new pair. Never called automatically.
    async fn refresh_token(&self) -> bool;
}

#[async_trait]
pub trait PricingAdapter: Send + Sync {
    /// Raw price record for one marketplace item.
    async fn product_pricing(&self, product_id: &str) -> Result<serde_json::Value>;

    /// Sets the list and sale price of one marketplace item.
    async fn update_product_price(&self, product_id: &str, price: u64) -> bool;
}

/// Whether [`build`] has an adapter for `id`.
pub fn supports(id: ChannelId) -> bool {
    matches!(id, ChannelId::Naver | ChannelId::Coupang)
}

/// Builds the adapter for `config.id`.
pub fn build(config: ChannelConfig, http: ChannelHttp) -> Result<Arc<dyn ChannelAdapter>> {
    match config.id {
        ChannelId::Naver => Ok(Arc::new(NaverAdapter::new(config, http)?)),
        ChannelId::Coupang => Ok(Arc::new(CoupangAdapter::new(config, http)?)),
        ChannelId::TwentyNineCm
        | ChannelId::Ohouse
        | ChannelId::CjOnstyle
        | ChannelId::Kakao
        | ChannelId::Imweb
        | ChannelId::Toss => Err(ChannelError::Unsupported(config.id)),
    }
}

/// Config and HTTP client shared by the concrete adapters.
pub(crate) struct AdapterCore {
    id: ChannelId,
    config: RwLock<ChannelConfig>,
    http: ChannelHttp,
}

impl AdapterCore {
    pub(crate) fn new(config: ChannelConfig, http: ChannelHttp) -> Self {
        Self { id: config.id, config: RwLock::new(config), http }
    }

    pub(crate) fn id(&self) -> ChannelId { self.id }
    pub(crate) fn http(&self) -> &ChannelHttp { &self.http }

    pub(crate) async fn snapshot(&self) -> ChannelConfig {
        self.config.read().await.clone()
    }

    pub(crate) async fn update(&self, f: impl FnOnce(&mut ChannelConfig) + Send) {
        let mut config = self.config.write().await;
        f(&mut config);
    }

    pub(crate) async fn apply(&self, patch: &ChannelConfigPatch) {
        self.config.write().await.apply(patch);
    }

    pub(crate) async fn mark_connected(&self) -> bool {
        self.config.write().await.mark_connected(Utc::now())
    }

    pub(crate) async fn mark_error(&self, error: &ChannelError) {
        self.config.write().await.mark_error(error.to_string());
    }

    /// Converts a sync outcome into a result record, marking the channel on failure.
    pub(crate) async fn finish_sync(&self, sync_type: SyncType, outcome: Result<u32>) -> ChannelSyncResult {
        match outcome {
            Ok(count) => {
                tracing::info!(channel = %self.id, sync = sync_type.as_str(), count, "sync completed");
                self.update(|c| {
                    c.last_sync = Some(Utc::now());
                    c.last_error = None;
                }).await;
                ChannelSyncResult::succeeded(self.id, sync_type, count)
            }
            Err(e) => {
                tracing::error!(channel = %self.id, sync = sync_type.as_str(), error = %e, "sync failed");
                self.mark_error(&e).await;
                ChannelSyncResult::failed(self.id, sync_type, e.to_string())
            }
        }
    }

    /// Converts a boolean-reporting outcome, marking the channel on failure.
    pub(crate) async fn finish(&self, operation: &'static str, outcome: Result<bool>) -> bool {
        match outcome {
            Ok(ok) => ok,
            Err(e) => {
                tracing::error!(channel = %self.id, operation, error = %e, "channel call failed");
                self.mark_error(&e).await;
                false
            }
        }
    }
}

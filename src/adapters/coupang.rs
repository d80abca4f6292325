//! Coupang Wing seller API adapter.
//!
//! Every request is signed with HMAC-SHA256 over
//! `{method}{path}{accessKey}{timestamp}` using the seller's secret key and
//! carried in a `CEA` authorization header.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{json, Value};
use sha2::Sha256;

use super::http::count_at;
use super::{AdapterCore, CallClass, ChannelAdapter, ChannelHttp, PricingAdapter};
use crate::domain::aggregates::{ApiKeyCredentials, ChannelConfig, ChannelConfigPatch, ChannelSyncResult};
use crate::domain::value_objects::{ChannelId, SyncType};
use crate::{ChannelError, Result};

type HmacSha256 = Hmac<Sha256>;

const API_ROOT: &str = "/v2/providers/seller_api/apis/api/v1/marketplace";
const ORDER_WINDOW_DAYS: i64 = 7;
const ORDERS_PER_PAGE: u32 = 50;

pub struct CoupangAdapter {
    core: AdapterCore,
}

impl CoupangAdapter {
    pub fn new(config: ChannelConfig, http: ChannelHttp) -> Result<Self> {
        if config.api_key().is_none() {
            return Err(ChannelError::CredentialMismatch(config.id));
        }
        Ok(Self { core: AdapterCore::new(config, http) })
    }

    /// Hex HMAC-SHA256 of `{method}{path}{access_key}{timestamp}`.
    pub fn sign(secret_key: &str, method: &str, path: &str, access_key: &str, timestamp: &str) -> String {
        let message = format!("{method}{path}{access_key}{timestamp}");
        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).expect("HMAC can take key of any size");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn authorization_header(creds: &ApiKeyCredentials, method: &str, path: &str, timestamp: &str) -> String {
        let signature = Self::sign(&creds.secret_key, method, path, &creds.access_key, timestamp);
        format!(
            "CEA algorithm=HmacSHA256, access-key={}, signed-date={}, signature={}",
            creds.access_key, timestamp, signature
        )
    }

    /// Credentials, refusing to proceed unless all three fields are set.
    async fn credentials(&self) -> Result<ApiKeyCredentials> {
        let config = self.core.snapshot().await;
        let missing = config.missing_fields();
        if !missing.is_empty() {
            return Err(ChannelError::IncompleteConfig { id: config.id, missing: missing.join(", ") });
        }
        config.api_key().cloned().ok_or(ChannelError::CredentialMismatch(config.id))
    }

    async fn request(&self, method: Method, path: &str, query: &[(&str, String)], body: Option<Value>, class: CallClass) -> Result<Value> {
        let creds = self.credentials().await?;
        let timestamp = Utc::now().timestamp_millis().to_string();
        let authorization = Self::authorization_header(&creds, method.as_str(), path, &timestamp);
        let http = self.core.http();
        let url = format!("{}{}", http.endpoints().coupang_api, path);

        tracing::debug!(channel = %self.core.id(), method = %method, path, "coupang request");
        let mut request = http.client()
            .request(method, url)
            .header(CONTENT_TYPE, "application/json;charset=UTF-8")
            .header(AUTHORIZATION, authorization)
            .header("X-EXTENDED-TIMEOUT", "90000");
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        http.send_json(request, class).await
    }

    fn ensure_success(body: &Value) -> Result<()> {
        if body.get("code").and_then(Value::as_str) == Some("SUCCESS") {
            return Ok(());
        }
        let message = body.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        Err(ChannelError::Rejected(message.to_string()))
    }

    async fn try_test_connection(&self) -> Result<bool> {
        let body = self.request(Method::GET, &format!("{API_ROOT}/seller-info"), &[], None, CallClass::Read).await?;
        Self::ensure_success(&body)?;
        let connected = self.core.mark_connected().await;
        tracing::info!(channel = %self.core.id(), "coupang connection test succeeded");
        Ok(connected)
    }

    async fn try_sync_products(&self) -> Result<u32> {
        let body = self.request(Method::GET, &format!("{API_ROOT}/vendor-items"), &[], None, CallClass::Sync).await?;
        Ok(count_at(&body, "/data/content"))
    }

    async fn try_sync_orders(&self) -> Result<u32> {
        let to = Utc::now();
        let from = to - Duration::days(ORDER_WINDOW_DAYS);
        let query = [
            ("createdAtFrom", from.to_rfc3339()),
            ("createdAtTo", to.to_rfc3339()),
            ("maxPerPage", ORDERS_PER_PAGE.to_string()),
        ];
        let body = self.request(Method::GET, &format!("{API_ROOT}/orders"), &query, None, CallClass::Sync).await?;
        Ok(count_at(&body, "/data/content"))
    }

    async fn try_update_inventory(&self, product_id: &str, stock: u32) -> Result<bool> {
        let path = format!("{API_ROOT}/vendor-items/{product_id}/prices/quantity");
        let body = self.request(Method::PUT, &path, &[], Some(json!({ "quantity": stock })), CallClass::Write).await?;
        Self::ensure_success(&body)?;
        tracing::info!(channel = %self.core.id(), product_id, stock, "coupang inventory updated");
        Ok(true)
    }

    async fn try_update_product_price(&self, product_id: &str, price: u64) -> Result<bool> {
        let path = format!("{API_ROOT}/vendor-items/{product_id}/prices");
        let body = json!({ "originalPrice": price, "salePrice": price });
        let response = self.request(Method::PUT, &path, &[], Some(body), CallClass::Write).await?;
        Self::ensure_success(&response)?;
        Ok(true)
    }
}

#[async_trait]
impl ChannelAdapter for CoupangAdapter {
    fn channel_id(&self) -> ChannelId { ChannelId::Coupang }

    async fn config(&self) -> ChannelConfig { self.core.snapshot().await }

    async fn update_config(&self, patch: &ChannelConfigPatch) { self.core.apply(patch).await }

    async fn authenticate(&self) -> bool {
        tracing::info!(channel = %self.core.id(), "validating coupang credentials");
        // API-key auth: a successful signed call is the proof
        self.test_connection().await
    }

    async fn test_connection(&self) -> bool {
        let outcome = self.try_test_connection().await;
        self.core.finish("test_connection", outcome).await
    }

    async fn sync_products(&self) -> ChannelSyncResult {
        let outcome = self.try_sync_products().await;
        self.core.finish_sync(SyncType::Products, outcome).await
    }

    async fn sync_orders(&self) -> ChannelSyncResult {
        let outcome = self.try_sync_orders().await;
        self.core.finish_sync(SyncType::Orders, outcome).await
    }

    async fn update_inventory(&self, product_id: &str, stock: u32) -> bool {
        let outcome = self.try_update_inventory(product_id, stock).await;
        self.core.finish("update_inventory", outcome).await
    }

    fn pricing(&self) -> Option<&dyn PricingAdapter> {
        Some(self)
    }
}

#[async_trait]
impl PricingAdapter for CoupangAdapter {
    async fn product_pricing(&self, product_id: &str) -> Result<Value> {
        let path = format!("{API_ROOT}/vendor-items/{product_id}/prices");
        self.request(Method::GET, &path, &[], None, CallClass::Read).await
    }

    async fn update_product_price(&self, product_id: &str, price: u64) -> bool {
        let outcome = self.try_update_product_price(product_id, price).await;
        self.core.finish("update_product_price", outcome).await
    }
}

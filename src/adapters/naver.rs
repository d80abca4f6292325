//! Naver Smart Store (Commerce API) adapter.
//!
//! Authenticates with the OAuth2 authorization-code flow against Naver ID.
//! API calls carry the access token as a bearer credential. Token expiry is
//! not detected here; callers refresh explicitly, typically after a 401.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use url::Url;

use super::http::count_at;
use super::{AdapterCore, AuthorizationRequest, CallClass, ChannelAdapter, ChannelHttp, OAuthAdapter};
use crate::domain::aggregates::{ChannelConfig, ChannelConfigPatch, ChannelSyncResult, OAuthCredentials};
use crate::domain::value_objects::{ChannelId, ChannelStatus, SyncType};
use crate::{ChannelError, Result};

const AUTHORIZE_PATH: &str = "/oauth2.0/authorize";
const TOKEN_PATH: &str = "/oauth2.0/token";
const SCOPE: &str = "commerce.read,commerce.write";
const STATE_LEN: usize = 32;
const ORDER_WINDOW_DAYS: i64 = 7;
const ORDERS_PER_PAGE: u32 = 100;

#[derive(Debug, PartialEq, Eq)]
struct TokenPair {
    access_token: String,
    refresh_token: Option<String>,
}

pub struct NaverAdapter {
    core: AdapterCore,
    pending_state: Mutex<Option<String>>,
}

impl NaverAdapter {
    pub fn new(config: ChannelConfig, http: ChannelHttp) -> Result<Self> {
        if config.oauth().is_none() {
            return Err(ChannelError::CredentialMismatch(config.id));
        }
        Ok(Self { core: AdapterCore::new(config, http), pending_state: Mutex::new(None) })
    }

    /// Client credentials, refusing to proceed unless both are set.
    async fn client_credentials(&self) -> Result<OAuthCredentials> {
        let config = self.core.snapshot().await;
        let missing = config.missing_fields();
        if !missing.is_empty() {
            return Err(ChannelError::IncompleteConfig { id: config.id, missing: missing.join(", ") });
        }
        config.oauth().cloned().ok_or(ChannelError::CredentialMismatch(config.id))
    }

    async fn access_token(&self) -> Result<String> {
        self.core.snapshot().await
            .oauth()
            .and_then(|c| c.access_token.clone())
            .filter(|t| !t.is_empty())
            .ok_or(ChannelError::AuthenticationRequired)
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.core.http().endpoints().naver_api, path)
    }

    async fn get(&self, path: &str, query: &[(&str, String)], class: CallClass) -> Result<Value> {
        let token = self.access_token().await?;
        let http = self.core.http();
        tracing::debug!(channel = %self.core.id(), path, "naver request");
        let request = http.client()
            .get(self.api_url(path))
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/json")
            .query(query);
        http.send_json(request, class).await
    }

    async fn request_tokens(&self, form: &[(&str, &str)]) -> Result<TokenPair> {
        let http = self.core.http();
        let url = format!("{}{}", http.endpoints().naver_auth, TOKEN_PATH);
        let body = http.send_json(http.client().post(url).form(form), CallClass::Read).await?;
        parse_token_response(&body)
    }

    async fn store_tokens(&self, tokens: TokenPair) {
        self.core.update(move |config| {
            if let Some(creds) = config.oauth_mut() {
                creds.access_token = Some(tokens.access_token);
                if tokens.refresh_token.is_some() {
                    creds.refresh_token = tokens.refresh_token;
                }
            }
        }).await;
    }

    async fn try_test_connection(&self) -> Result<bool> {
        self.client_credentials().await?;
        self.get("/external/v1/seller-info", &[], CallClass::Read).await?;
        let connected = self.core.mark_connected().await;
        tracing::info!(channel = %self.core.id(), "naver connection test succeeded");
        Ok(connected)
    }

    async fn try_authenticate(&self) -> Result<bool> {
        let creds = self.client_credentials().await?;
        if creds.access_token.as_deref().is_some_and(|t| !t.is_empty()) {
            return self.try_test_connection().await;
        }
        if creds.refresh_token.is_some() {
            self.try_refresh_token().await?;
            return self.try_test_connection().await;
        }
        // Seller consent is needed before any token can be issued
        tracing::info!(channel = %self.core.id(), "naver authorization pending seller consent");
        self.core.update(|c| c.status = ChannelStatus::Pending).await;
        Ok(false)
    }

    async fn try_refresh_token(&self) -> Result<bool> {
        let creds = self.client_credentials().await?;
        let refresh_token = creds.refresh_token.clone().ok_or(ChannelError::AuthenticationRequired)?;
        let tokens = self.request_tokens(&[
            ("grant_type", "refresh_token"),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
        ]).await?;
        self.store_tokens(tokens).await;
        tracing::info!(channel = %self.core.id(), "naver token refreshed");
        Ok(true)
    }

    async fn try_sync_products(&self) -> Result<u32> {
        let body = self.get("/external/v2/products", &[], CallClass::Sync).await?;
        Ok(count_at(&body, "/data"))
    }

    async fn try_sync_orders(&self) -> Result<u32> {
        let to = Utc::now();
        let from = to - Duration::days(ORDER_WINDOW_DAYS);
        let query = [
            ("lastChangedFrom", from.to_rfc3339()),
            ("lastChangedTo", to.to_rfc3339()),
            ("limit", ORDERS_PER_PAGE.to_string()),
        ];
        let body = self.get("/external/v1/pay-order/seller/product-orders", &query, CallClass::Sync).await?;
        Ok(count_at(&body, "/data"))
    }

    async fn try_update_inventory(&self, product_id: &str, stock: u32) -> Result<bool> {
        let token = self.access_token().await?;
        let http = self.core.http();
        let request = http.client()
            .put(self.api_url(&format!("/external/v2/products/{product_id}/stock")))
            .bearer_auth(token)
            .json(&json!({ "stock": stock }));
        http.send_json(request, CallClass::Write).await?;
        tracing::info!(channel = %self.core.id(), product_id, stock, "naver inventory updated");
        Ok(true)
    }
}

fn generate_state() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(STATE_LEN).map(char::from).collect()
}

fn parse_token_response(body: &Value) -> Result<TokenPair> {
    let Some(access_token) = body.get("access_token").and_then(Value::as_str) else {
        let reason = body.get("error_description")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("missing access_token in response");
        return Err(ChannelError::Rejected(reason.to_string()));
    };
    Ok(TokenPair {
        access_token: access_token.to_string(),
        refresh_token: body.get("refresh_token").and_then(Value::as_str).map(str::to_string),
    })
}

#[async_trait]
impl ChannelAdapter for NaverAdapter {
    fn channel_id(&self) -> ChannelId { ChannelId::Naver }

    async fn config(&self) -> ChannelConfig { self.core.snapshot().await }

    async fn update_config(&self, patch: &ChannelConfigPatch) { self.core.apply(patch).await }

    async fn authenticate(&self) -> bool {
        tracing::info!(channel = %self.core.id(), "starting naver authentication");
        let outcome = self.try_authenticate().await;
        self.core.finish("authenticate", outcome).await
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

    fn oauth(&self) -> Option<&dyn OAuthAdapter> {
        Some(self)
    }
}

#[async_trait]
impl OAuthAdapter for NaverAdapter {
    async fn authorization_url(&self, redirect_uri: &str) -> Result<AuthorizationRequest> {
        let creds = self.client_credentials().await?;
        let state = generate_state();
        let mut url = Url::parse(&format!("{}{}", self.core.http().endpoints().naver_auth, AUTHORIZE_PATH))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", creds.client_id.as_str())
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", SCOPE)
            .append_pair("state", &state);
        *self.pending_state.lock().await = Some(state.clone());
        tracing::info!(channel = %self.core.id(), "naver authorization url issued");
        Ok(AuthorizationRequest { url: url.to_string(), state })
    }

    async fn exchange_code(&self, code: &str, state: &str) -> Result<()> {
        {
            // a mismatched callback leaves the seller's pending consent intact
            let mut pending = self.pending_state.lock().await;
            if pending.as_deref() != Some(state) {
                tracing::warn!(channel = %self.core.id(), "naver oauth callback with unexpected state");
                return Err(ChannelError::StateMismatch);
            }
            pending.take();
        }
        let creds = self.client_credentials().await?;
        let outcome = self.request_tokens(&[
            ("grant_type", "authorization_code"),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("code", code),
            ("state", state),
        ]).await;
        match outcome {
            Ok(tokens) => {
                self.store_tokens(tokens).await;
                self.core.mark_connected().await;
                tracing::info!(channel = %self.core.id(), "naver authorization completed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(channel = %self.core.id(), error = %e, "naver token exchange failed");
                self.core.mark_error(&e).await;
                Err(e)
            }
        }
    }

    async fn refresh_token(&self) -> bool {
        let outcome = self.try_refresh_token().await;
        self.core.finish("refresh_token", outcome).await
    }
}

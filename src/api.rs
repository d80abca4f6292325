//! REST API over [`ChannelService`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::adapters::AuthorizationRequest;
use crate::domain::aggregates::{ChannelConfig, ChannelConfigPatch, ChannelSyncResult};
use crate::domain::value_objects::{ChannelId, ChannelStatus, ChannelType};
use crate::registry::ChannelStats;
use crate::service::{ChannelService, TestOutcome};
use crate::ChannelError;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChannelService>,
}

type ApiResult<T> = Result<Json<T>, ChannelError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "opensase-channels"})) }))
        .route("/api/v1/channels", get(list_channels))
        .route("/api/v1/channels/stats", get(channel_stats))
        .route("/api/v1/channels/test-all", post(test_all))
        .route("/api/v1/channels/sync-all", post(sync_all_orders))
        .route("/api/v1/channels/sync-all/products", post(sync_all_products))
        .route("/api/v1/channels/:id", get(get_channel))
        .route("/api/v1/channels/:id/config", put(update_config))
        .route("/api/v1/channels/:id/test", post(test_connection))
        .route("/api/v1/channels/:id/sync", post(sync_orders))
        .route("/api/v1/channels/:id/sync/products", post(sync_products))
        .route("/api/v1/channels/:id/history", get(sync_history))
        .route("/api/v1/channels/:id/products/:product_id/price", get(product_price).put(update_product_price))
        .route("/api/v1/inventory/:product_id", put(push_inventory))
        .route("/api/v1/oauth/naver/authorize", get(naver_authorize))
        .route("/api/v1/oauth/naver/callback", get(naver_callback))
        .route("/api/v1/oauth/naver/refresh", post(naver_refresh))
        .with_state(state)
}

impl IntoResponse for ChannelError {
    fn into_response(self) -> Response {
        let status = match &self {
            ChannelError::NotFound(_) | ChannelError::UnknownChannel(_) => StatusCode::NOT_FOUND,
            ChannelError::Unsupported(_)
            | ChannelError::IncompleteConfig { .. }
            | ChannelError::CredentialMismatch(_)
            | ChannelError::NotConnected(_)
            | ChannelError::AuthenticationRequired
            | ChannelError::StateMismatch
            | ChannelError::Validation(_) => StatusCode::BAD_REQUEST,
            ChannelError::Api { .. }
            | ChannelError::Rejected(_)
            | ChannelError::Http(_)
            | ChannelError::Url(_)
            | ChannelError::Json(_) => StatusCode::BAD_GATEWAY,
            ChannelError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Channel as shown to API clients. Credentials never leave the service.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub id: ChannelId,
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub status: ChannelStatus,
    pub description: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub configured: bool,
    pub missing_fields: Vec<&'static str>,
}

impl From<ChannelConfig> for ChannelView {
    fn from(config: ChannelConfig) -> Self {
        let missing_fields = config.missing_fields();
        Self {
            id: config.id,
            channel_type: config.channel_type(),
            status: config.status,
            configured: missing_fields.is_empty(),
            missing_fields,
            name: config.name,
            description: config.description,
            last_sync: config.last_sync,
            last_error: config.last_error,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StockUpdate { pub stock: u32 }

#[derive(Debug, Deserialize)]
pub struct PriceUpdate { pub price: u64 }

#[derive(Debug, Deserialize)]
pub struct OAuthCallback { pub code: String, pub state: String }

#[derive(Debug, Serialize)]
pub struct OperationResult { pub success: bool }

fn parse_id(raw: &str) -> Result<ChannelId, ChannelError> {
    Ok(raw.parse()?)
}

fn sorted<T>(results: HashMap<ChannelId, T>) -> BTreeMap<ChannelId, T> {
    results.into_iter().collect()
}

async fn list_channels(State(s): State<AppState>) -> ApiResult<Vec<ChannelView>> {
    let channels = s.service.list_channels().await?;
    Ok(Json(channels.into_iter().map(ChannelView::from).collect()))
}

async fn get_channel(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<ChannelView> {
    Ok(Json(s.service.get_channel(parse_id(&id)?).await?.into()))
}

async fn update_config(State(s): State<AppState>, Path(id): Path<String>, Json(patch): Json<ChannelConfigPatch>) -> ApiResult<ChannelView> {
    Ok(Json(s.service.update_config(parse_id(&id)?, &patch).await?.into()))
}

async fn test_connection(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<TestOutcome> {
    Ok(Json(s.service.test_connection(parse_id(&id)?).await?))
}

async fn sync_orders(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<ChannelSyncResult> {
    Ok(Json(s.service.sync_orders(parse_id(&id)?).await?))
}

async fn sync_products(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<ChannelSyncResult> {
    Ok(Json(s.service.sync_products(parse_id(&id)?).await?))
}

async fn sync_history(State(s): State<AppState>, Path(id): Path<String>) -> ApiResult<Vec<ChannelSyncResult>> {
    Ok(Json(s.service.history(parse_id(&id)?).await?))
}

async fn test_all(State(s): State<AppState>) -> ApiResult<BTreeMap<ChannelId, bool>> {
    Ok(Json(sorted(s.service.test_all().await?)))
}

async fn sync_all_orders(State(s): State<AppState>) -> ApiResult<BTreeMap<ChannelId, ChannelSyncResult>> {
    Ok(Json(sorted(s.service.sync_all_orders().await?)))
}

async fn sync_all_products(State(s): State<AppState>) -> ApiResult<BTreeMap<ChannelId, ChannelSyncResult>> {
    Ok(Json(sorted(s.service.sync_all_products().await?)))
}

async fn push_inventory(State(s): State<AppState>, Path(product_id): Path<String>, Json(body): Json<StockUpdate>) -> ApiResult<BTreeMap<ChannelId, bool>> {
    Ok(Json(sorted(s.service.push_inventory(&product_id, body.stock).await?)))
}

async fn channel_stats(State(s): State<AppState>) -> Json<BTreeMap<ChannelId, ChannelStats>> {
    Json(s.service.stats().await)
}

async fn product_price(State(s): State<AppState>, Path((id, product_id)): Path<(String, String)>) -> ApiResult<Value> {
    Ok(Json(s.service.product_pricing(parse_id(&id)?, &product_id).await?))
}

async fn update_product_price(State(s): State<AppState>, Path((id, product_id)): Path<(String, String)>, Json(body): Json<PriceUpdate>) -> ApiResult<OperationResult> {
    let success = s.service.update_product_price(parse_id(&id)?, &product_id, body.price).await?;
    Ok(Json(OperationResult { success }))
}

async fn naver_authorize(State(s): State<AppState>) -> ApiResult<AuthorizationRequest> {
    Ok(Json(s.service.naver_authorization_url().await?))
}

async fn naver_callback(State(s): State<AppState>, Query(q): Query<OAuthCallback>) -> ApiResult<ChannelView> {
    Ok(Json(s.service.complete_naver_oauth(&q.code, &q.state).await?.into()))
}

async fn naver_refresh(State(s): State<AppState>) -> ApiResult<OperationResult> {
    Ok(Json(OperationResult { success: s.service.refresh_naver_token().await? }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ChannelHttp;
    use crate::config::{Endpoints, Timeouts};
    use crate::publisher::EventPublisher;
    use crate::registry::ChannelRegistry;
    use crate::store::InMemoryChannelStore;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use tower::ServiceExt;

    async fn app() -> Router {
        let http = ChannelHttp::new(Endpoints::all("http://127.0.0.1:9"), Timeouts::default()).unwrap();
        let service = ChannelService::new(
            Arc::new(InMemoryChannelStore::new()),
            Arc::new(ChannelRegistry::new(http)),
            EventPublisher::disabled(),
            "http://localhost/callback",
        );
        service.initialize_default_channels().await.unwrap();
        router(AppState { service: Arc::new(service) })
    }

    async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(app().await, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_list_channels_hides_credentials() {
        let (status, body) = call(app().await, Method::GET, "/api/v1/channels", None).await;
        assert_eq!(status, StatusCode::OK);
        let channels = body.as_array().unwrap();
        assert_eq!(channels.len(), 8);
        assert_eq!(channels[0]["id"], "naver");
        assert_eq!(channels[0]["type"], "oauth");
        assert_eq!(channels[0]["configured"], false);
        assert!(channels[0].get("clientSecret").is_none());
    }

    #[tokio::test]
    async fn test_unknown_channel_is_404() {
        let (status, body) = call(app().await, Method::GET, "/api/v1/channels/amazon", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("amazon"));
    }

    #[tokio::test]
    async fn test_save_config_then_incomplete_test_is_400() {
        let app = app().await;
        let (status, body) = call(
            app.clone(),
            Method::PUT,
            "/api/v1/channels/coupang/config",
            Some(json!({"accessKey": "AK", "secretKey": "SK"})),
        ).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "disconnected");
        assert_eq!(body["missingFields"], json!(["vendorId"]));

        let (status, body) = call(app, Method::POST, "/api/v1/channels/coupang/test", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("vendorId"));
    }

    #[tokio::test]
    async fn test_sync_on_disconnected_channel_is_400() {
        let (status, _) = call(app().await, Method::POST, "/api/v1/channels/coupang/sync", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stats_lists_registered_channels() {
        let (status, body) = call(app().await, Method::GET, "/api/v1/channels/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["coupang"]["successfulSyncs"], 0);
        assert!(body.get("naver").is_some());
        assert!(body.get("toss").is_none());
    }

    #[tokio::test]
    async fn test_history_of_unsynced_channel_is_empty() {
        let (status, body) = call(app().await, Method::GET, "/api/v1/channels/29cm/history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }
}

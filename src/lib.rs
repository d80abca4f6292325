//! OpenSASE Channels
//!
//! Multi-channel marketplace integration for the OpenSASE order-management
//! backend.
//!
//! ## Features
//! - Per-marketplace adapters (Naver Smart Store, Coupang)
//! - Connection testing and OAuth token management
//! - Product and order synchronization
//! - Inventory push-back to every connected channel
//! - Fan-out bulk operations with per-channel outcomes

use thiserror::Error;

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod publisher;
pub mod registry;
pub mod service;
pub mod store;

pub use adapters::ChannelAdapter;
pub use config::AppConfig;
pub use domain::aggregates::{ChannelConfig, ChannelConfigPatch, ChannelSyncResult, Credentials};
pub use domain::value_objects::{ChannelId, ChannelStatus, ChannelType, SyncType};
pub use registry::{ChannelRegistry, ChannelStats};
pub use service::ChannelService;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel not found: {0}")]
    NotFound(ChannelId),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Channel {0} is not supported yet")]
    Unsupported(ChannelId),

    #[error("Channel {id} configuration is incomplete, missing {missing}")]
    IncompleteConfig { id: ChannelId, missing: String },

    #[error("Channel {0} credentials do not match its adapter")]
    CredentialMismatch(ChannelId),

    #[error("Channel {0} is not connected")]
    NotConnected(ChannelId),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("OAuth state mismatch")]
    StateMismatch,

    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("API returned error: {0}")]
    Rejected(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<sqlx::Error> for ChannelError {
    fn from(e: sqlx::Error) -> Self { Self::StorageError(e.to_string()) }
}

impl From<domain::value_objects::UnknownChannel> for ChannelError {
    fn from(e: domain::value_objects::UnknownChannel) -> Self { Self::UnknownChannel(e.0) }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

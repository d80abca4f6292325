//! Aggregates module
pub mod channel;
pub mod sync_result;

pub use channel::{default_channels, ApiKeyCredentials, ChannelConfig, ChannelConfigPatch, Credentials, OAuthCredentials, WebhookCredentials};
pub use sync_result::{ChannelSyncResult, SyncHistory, SYNC_HISTORY_LIMIT};

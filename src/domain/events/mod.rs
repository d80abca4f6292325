//! Domain events
use crate::domain::value_objects::{ChannelId, SyncType};
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChannelEvent {
    Configured { channel_id: ChannelId, complete: bool },
    Connected { channel_id: ChannelId },
    ConnectionFailed { channel_id: ChannelId, reason: Option<String> },
    SyncCompleted { channel_id: ChannelId, sync_type: SyncType, success: bool, processed_count: u32 },
    InventoryPushed { channel_id: ChannelId, product_id: String, stock: u32, success: bool },
}

impl ChannelEvent {
    pub fn channel_id(&self) -> ChannelId {
        match self {
            Self::Configured { channel_id, .. }
            | Self::Connected { channel_id }
            | Self::ConnectionFailed { channel_id, .. }
            | Self::SyncCompleted { channel_id, .. }
            | Self::InventoryPushed { channel_id, .. } => *channel_id,
        }
    }

    /// NATS subject suffix.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configured { .. } => "configured",
            Self::Connected { .. } => "connected",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::SyncCompleted { .. } => "sync_completed",
            Self::InventoryPushed { .. } => "inventory_pushed",
        }
    }
}

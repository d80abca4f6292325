//! Sync outcomes and the bounded per-channel history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;
use crate::domain::value_objects::{ChannelId, SyncType};

pub const SYNC_HISTORY_LIMIT: usize = 10;

/// Outcome of one synchronization attempt against one channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSyncResult {
    pub id: Uuid,
    pub channel_id: ChannelId,
    pub sync_type: SyncType,
    pub success: bool,
    pub processed_count: u32,
    pub error_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    pub last_sync_time: DateTime<Utc>,
}

impl ChannelSyncResult {
    pub fn succeeded(channel_id: ChannelId, sync_type: SyncType, processed_count: u32) -> Self {
        Self {
            id: Uuid::now_v7(), channel_id, sync_type, success: true,
            processed_count, error_count: 0, errors: None, last_sync_time: Utc::now(),
        }
    }

    pub fn failed(channel_id: ChannelId, sync_type: SyncType, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(), channel_id, sync_type, success: false,
            processed_count: 0, error_count: 1, errors: Some(vec![error.into()]), last_sync_time: Utc::now(),
        }
    }
}

/// Most-recent-first ring of sync results, capped at [`SYNC_HISTORY_LIMIT`].
#[derive(Clone, Debug, Default)]
pub struct SyncHistory { entries: VecDeque<ChannelSyncResult> }

impl SyncHistory {
    pub fn new() -> Self { Self { entries: VecDeque::with_capacity(SYNC_HISTORY_LIMIT) } }

    pub fn record(&mut self, result: ChannelSyncResult) {
        self.entries.push_front(result);
        self.entries.truncate(SYNC_HISTORY_LIMIT);
    }


    pub fn latest_success(&self, sync_type: SyncType) -> Option<&ChannelSyncResult> {
        self.entries.iter().find(|r| r.success && r.sync_type == sync_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelSyncResult> { self.entries.iter() }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn to_vec(&self) -> Vec<ChannelSyncResult> { self.entries.iter().cloned().collect() }
}

//! Trait abstractions for node record storage.
//!
//! Node records are written by the node agents themselves; the bot only
//! reads them and fills in the linked Discord user.

use crate::discord::traits::UserRef;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// A node check-in as stored in the `node_records` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: String,

    /// Discord user the node is linked to, if any
    #[serde(default)]
    pub discord_user_id: Option<String>,

    /// Last time the agent reported in
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub peer_count: Option<i64>,
}

impl NodeRecord {
    /// Create an unlinked record with no metadata.
    pub fn new(node_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            node_id: node_id.into(),
            discord_user_id: None,
            timestamp,
            version: None,
            peer_count: None,
        }
    }

    pub fn linked_user(&self) -> Option<UserRef> {
        self.discord_user_id.clone().map(UserRef)
    }

    /// True if the record is younger than `window` at `now`.
    ///
    /// Timestamps ahead of `now` (agent clock skew) count as fresh.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match now.signed_duration_since(self.timestamp).to_std() {
            Ok(age) => age < window,
            Err(_) => true,
        }
    }
}

/// Accept both `timestamptz` (RFC 3339) and bare `timestamp` columns.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp '{}': {}", raw, e))
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Record store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Record store operations used by the gatekeeper.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Most recent record for a node ID.
    async fn latest_for_node(&self, node_id: &str) -> StoreResult<Option<NodeRecord>>;

    /// Most recent record linked to a user.
    async fn latest_for_user(&self, user: &UserRef) -> StoreResult<Option<NodeRecord>>;

    /// User linked to any record of this node ID, if one exists.
    async fn linked_user_for_node(&self, node_id: &str) -> StoreResult<Option<UserRef>>;

    /// Link `user` to the record matching exactly (`node_id`, `timestamp`).
    ///
    /// Returns the number of records updated; zero means the record changed
    /// since it was read.
    async fn link_user(
        &self,
        node_id: &str,
        timestamp: DateTime<Utc>,
        user: &UserRef,
    ) -> StoreResult<u64>;
}

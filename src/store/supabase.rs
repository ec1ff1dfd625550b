//! Supabase (PostgREST) node store.
//!
//! Talks to `{url}/rest/v1/{table}` with the service-role key. Queries map
//! one-to-one onto [`NodeStore`] operations:
//! - latest: `order=timestamp.desc&limit=1`
//! - linked check: `discord_user_id=not.is.null&limit=1`
//! - link: `PATCH` filtered on `node_id` and `timestamp`, with
//!   `Prefer: return=representation` so the matched rows come back

use super::traits::*;
use crate::discord::traits::UserRef;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Default timeout for store requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default table written by node agents.
pub const DEFAULT_TABLE: &str = "node_records";

/// PostgREST-backed node store.
pub struct SupabaseStore {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct LinkedRow {
    discord_user_id: Option<String>,
}

impl SupabaseStore {
    /// Create a store for `table` at the Supabase project `url`.
    pub fn new(url: &str, table: &str, api_key: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            endpoint: table_endpoint(url, table),
            api_key: api_key.into(),
        }
    }

    /// REST endpoint of the table.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn select<T: for<'de> Deserialize<'de>>(
        &self,
        query: &[(&str, String)],
    ) -> StoreResult<Vec<T>> {
        debug!(endpoint = %self.endpoint, ?query, "Querying node records");

        let response = self
            .authorized(self.http_client.get(&self.endpoint))
            .query(query)
            .send()
            .await
            .map_err(map_transport_error)?;

        decode(response).await
    }
}

fn table_endpoint(url: &str, table: &str) -> String {
    format!("{}/rest/v1/{}", url.trim_end_matches('/'), table)
}

/// PostgREST `eq.` filter on a timestamp, at full microsecond precision.
fn timestamp_filter(timestamp: DateTime<Utc>) -> String {
    format!(
        "eq.{}",
        timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    )
}

fn map_transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Network(format!("request timed out: {e}"))
    } else if e.is_connect() {
        StoreError::Network(format!("connection failed: {e}"))
    } else {
        StoreError::Network(e.to_string())
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> StoreResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Http {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| StoreError::InvalidResponse(format!("failed to parse rows: {e}")))
}

#[async_trait]
impl NodeStore for SupabaseStore {
    async fn latest_for_node(&self, node_id: &str) -> StoreResult<Option<NodeRecord>> {
        let rows: Vec<NodeRecord> = self
            .select(&[
                ("select", "*".to_string()),
                ("node_id", format!("eq.{node_id}")),
                ("order", "timestamp.desc".to_string()),
                ("limit", "1".to_string()),
            ])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn latest_for_user(&self, user: &UserRef) -> StoreResult<Option<NodeRecord>> {
        let rows: Vec<NodeRecord> = self
            .select(&[
                ("select", "*".to_string()),
                ("discord_user_id", format!("eq.{user}")),
                ("order", "timestamp.desc".to_string()),
                ("limit", "1".to_string()),
            ])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn linked_user_for_node(&self, node_id: &str) -> StoreResult<Option<UserRef>> {
        let rows: Vec<LinkedRow> = self
            .select(&[
                ("select", "discord_user_id".to_string()),
                ("node_id", format!("eq.{node_id}")),
                ("discord_user_id", "not.is.null".to_string()),
                ("limit", "1".to_string()),
            ])
            .await?;
        Ok(rows
            .into_iter()
            .find_map(|row| row.discord_user_id.map(UserRef)))
    }

    async fn link_user(
        &self,
        node_id: &str,
        timestamp: DateTime<Utc>,
        user: &UserRef,
    ) -> StoreResult<u64> {
        debug!(endpoint = %self.endpoint, node_id, %user, "Linking node record");

        let response = self
            .authorized(self.http_client.patch(&self.endpoint))
            .header("Prefer", "return=representation")
            .query(&[
                ("node_id", format!("eq.{node_id}")),
                ("timestamp", timestamp_filter(timestamp)),
            ])
            .json(&serde_json::json!({ "discord_user_id": user.0 }))
            .send()
            .await
            .map_err(map_transport_error)?;

        let updated: Vec<serde_json::Value> = decode(response).await?;
        Ok(updated.len() as u64)
    }
}

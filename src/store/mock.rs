//! Mock node store for testing.

use super::traits::*;
use crate::discord::traits::UserRef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// In-memory node store.
#[derive(Clone, Default)]
pub struct MockNodeStore {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    records: Vec<NodeRecord>,
    queries: usize,
    fail_queries: bool,
    fail_updates: bool,
    /// Simulates an agent check-in landing between read and link
    touch_before_link: Option<DateTime<Utc>>,
}

impl MockNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record (for test setup).
    pub fn insert(&self, record: NodeRecord) {
        self.state.lock().unwrap().records.push(record);
    }

    /// All records, in insertion order.
    pub fn records(&self) -> Vec<NodeRecord> {
        self.state.lock().unwrap().records.clone()
    }

    /// Number of read queries served.
    pub fn query_count(&self) -> usize {
        self.state.lock().unwrap().queries
    }

    pub fn fail_queries(&self) {
        self.state.lock().unwrap().fail_queries = true;
    }

    pub fn fail_updates(&self) {
        self.state.lock().unwrap().fail_updates = true;
    }

    /// Before the next link, move every record of the target node to `timestamp`.
    pub fn touch_before_next_link(&self, timestamp: DateTime<Utc>) {
        self.state.lock().unwrap().touch_before_link = Some(timestamp);
    }

    fn read<T>(&self, query: impl FnOnce(&[NodeRecord]) -> T) -> StoreResult<T> {
        let mut state = self.state.lock().unwrap();
        state.queries += 1;
        if state.fail_queries {
            return Err(StoreError::Network("connection refused".to_string()));
        }
        Ok(query(&state.records))
    }
}

fn latest<'a>(records: impl Iterator<Item = &'a NodeRecord>) -> Option<NodeRecord> {
    records.max_by_key(|r| r.timestamp).cloned()
}

#[async_trait]
impl NodeStore for MockNodeStore {
    async fn latest_for_node(&self, node_id: &str) -> StoreResult<Option<NodeRecord>> {
        self.read(|records| latest(records.iter().filter(|r| r.node_id == node_id)))
    }

    async fn latest_for_user(&self, user: &UserRef) -> StoreResult<Option<NodeRecord>> {
        self.read(|records| {
            latest(
                records
                    .iter()
                    .filter(|r| r.discord_user_id.as_deref() == Some(user.0.as_str())),
            )
        })
    }

    async fn linked_user_for_node(&self, node_id: &str) -> StoreResult<Option<UserRef>> {
        self.read(|records| {
            records
                .iter()
                .filter(|r| r.node_id == node_id)
                .find_map(|r| r.linked_user())
        })
    }

    async fn link_user(
        &self,
        node_id: &str,
        timestamp: DateTime<Utc>,
        user: &UserRef,
    ) -> StoreResult<u64> {
        let mut state = self.state.lock().unwrap();
        if state.fail_updates {
            return Err(StoreError::Http {
                status: 500,
                body: "update failed".to_string(),
            });
        }

        if let Some(touched) = state.touch_before_link.take() {
            for record in state.records.iter_mut().filter(|r| r.node_id == node_id) {
                record.timestamp = touched;
            }
        }

        let mut updated = 0;
        for record in state
            .records
            .iter_mut()
            .filter(|r| r.node_id == node_id && r.timestamp == timestamp)
        {
            record.discord_user_id = Some(user.0.clone());
            updated += 1;
        }
        Ok(updated)
    }
}

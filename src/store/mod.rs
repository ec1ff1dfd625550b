//! Node record storage.
//!
//! Backends:
//! - Supabase (PostgREST over HTTPS) for hosted deployments
//! - SQLite for self-hosted deployments and integration tests
//! - In-memory mock for unit tests

pub mod mock;
pub mod sqlite;
pub mod supabase;
pub mod traits;

pub use mock::MockNodeStore;
pub use sqlite::SqliteStore;
pub use supabase::SupabaseStore;
pub use traits::{NodeRecord, NodeStore, StoreError, StoreResult};

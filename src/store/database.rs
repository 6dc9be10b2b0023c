use crate::core::{Result, Row};
use crate::tracking::key::KeyValue;
use crate::tracking::state::EntityState;
use async_trait::async_trait;
use serde::Serialize;

/// One prepared entry handed to the store: enough to build an insert,
/// update or delete without reaching back into the tracker.
#[derive(Debug, Clone, Serialize)]
pub struct SaveUnit {
    pub entity_type: String,
    pub state: EntityState,
    pub key: KeyValue,
    pub row: Row,
    pub original: Row,
}

/// The persistence collaborator: applies a batch of prepared entries and
/// reports the number of affected rows.
///
/// Failures are opaque to the tracking core — it only uses them to trigger
/// the discard of speculative store-generated values before re-raising.
#[async_trait]
pub trait Database: Send + Sync {
    fn save_changes(&self, entries: &[SaveUnit]) -> Result<usize>;

    async fn save_changes_async(&self, entries: &[SaveUnit]) -> Result<usize>;
}

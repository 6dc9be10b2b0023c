use crate::core::Result;
use crate::tracking::entry::Entry;

/// Collaborator invoked once per entry when it enters the manager: captures
/// the original-values snapshot and wires change notification.
///
/// Property writes flow through `StateManager::set_property_value`, which is
/// the notification channel a subscriber hooks into; the default subscriber
/// only needs the snapshot side.
pub trait EntrySubscriber: Send + Sync {
    /// Idempotent per entry: a second call on a subscribed entry is a no-op.
    fn snapshot_and_subscribe(&self, entry: &mut Entry) -> Result<()>;
}

/// Default subscriber: captures the snapshot, nothing else to wire.
#[derive(Debug, Default)]
pub struct SnapshotSubscriber;

impl SnapshotSubscriber {
    pub fn new() -> Self {
        Self
    }
}

impl EntrySubscriber for SnapshotSubscriber {
    fn snapshot_and_subscribe(&self, entry: &mut Entry) -> Result<()> {
        if entry.is_subscribed() {
            return Ok(());
        }
        entry.capture_snapshot()
    }
}

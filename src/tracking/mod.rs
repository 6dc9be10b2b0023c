pub mod config;
pub mod entity;
pub mod entry;
pub mod key;
pub mod manager;
pub mod snapshot;
pub mod state;
pub mod subscriber;

pub use config::TrackingOptions;
pub use entity::{Entity, EntityKey, Reference, WeakEntity};
pub use entry::{Entry, EntryFactory, EntryId, ManagerId, ValueSource};
pub use key::{KeyValue, KeyValueFactory, KeyValueFactorySource};
pub use manager::StateManager;
pub use snapshot::Snapshot;
pub use state::EntityState;
pub use subscriber::{EntrySubscriber, SnapshotSubscriber};

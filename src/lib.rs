// ============================================================================
// RustTrackDB Library
// ============================================================================

pub mod core;
pub mod model;
pub mod store;
pub mod tracking;

// Re-export main types for convenience
pub use crate::core::{DataType, Result, Row, TrackError, Value};
pub use crate::model::{
    DeleteBehavior, EntityType, ForeignKeyDef, Key, KeyId, Model, ModelBuilder, Property,
};
pub use crate::store::{Database, MemoryStore, SaveUnit, StandardValueGenerator, ValueGenerator};
pub use crate::tracking::{
    Entity, EntityState, Entry, EntryId, EntrySubscriber, KeyValue, Reference, SnapshotSubscriber,
    StateManager, TrackingOptions, ValueSource,
};

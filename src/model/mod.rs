pub mod builder;
pub mod entity_type;
pub mod relation;

pub use builder::{ForeignKeyDef, Model, ModelBuilder};
pub use entity_type::{EntityType, Key, KeyId, Property};
pub use relation::{DeleteBehavior, ForeignKey};

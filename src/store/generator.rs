use crate::core::{DataType, Result, TrackError, Value};
use crate::model::{EntityType, Property};
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

/// Collaborator that assigns values to properties requiring generation
/// (store-generated keys and the like) before a save.
pub trait ValueGenerator: Send + Sync {
    fn generate(&self, entity_type: &EntityType, property: &Property) -> Result<Value>;
}

/// Monotonic integer sequence, one counter per generator instance
#[derive(Debug)]
pub struct SequentialValueGenerator {
    next: AtomicI64,
}

impl SequentialValueGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }
}

impl Default for SequentialValueGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueGenerator for SequentialValueGenerator {
    fn generate(&self, entity_type: &EntityType, property: &Property) -> Result<Value> {
        match property.data_type {
            DataType::Integer => Ok(Value::Integer(self.next.fetch_add(1, Ordering::SeqCst))),
            other => Err(TrackError::ValueGeneration(format!(
                "Cannot generate a {} value for '{}.{}'",
                other,
                entity_type.name(),
                property.name
            ))),
        }
    }
}

/// Random v4 UUIDs for UUID and TEXT properties
#[derive(Debug, Default)]
pub struct UuidValueGenerator;

impl UuidValueGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl ValueGenerator for UuidValueGenerator {
    fn generate(&self, entity_type: &EntityType, property: &Property) -> Result<Value> {
        match property.data_type {
            DataType::Uuid => Ok(Value::Uuid(Uuid::new_v4())),
            DataType::Text => Ok(Value::Text(Uuid::new_v4().to_string())),
            other => Err(TrackError::ValueGeneration(format!(
                "Cannot generate a {} value for '{}.{}'",
                other,
                entity_type.name(),
                property.name
            ))),
        }
    }
}

/// Default strategy: sequences for integers, UUIDs for uuid/text slots
#[derive(Debug, Default)]
pub struct StandardValueGenerator {
    sequence: SequentialValueGenerator,
    uuid: UuidValueGenerator,
}

impl StandardValueGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValueGenerator for StandardValueGenerator {
    fn generate(&self, entity_type: &EntityType, property: &Property) -> Result<Value> {
        match property.data_type {
            DataType::Integer => self.sequence.generate(entity_type, property),
            DataType::Uuid | DataType::Text => self.uuid.generate(entity_type, property),
            other => Err(TrackError::ValueGeneration(format!(
                "Cannot generate a {} value for '{}.{}'",
                other,
                entity_type.name(),
                property.name
            ))),
        }
    }
}

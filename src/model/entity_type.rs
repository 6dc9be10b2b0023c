use crate::core::DataType;
use crate::model::relation::ForeignKey;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global key definition counter
static NEXT_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a key definition
///
/// Two key values are only comparable when they were produced for the same
/// key definition, so every `Key` gets a process-wide unique id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct KeyId(u64);

impl KeyId {
    pub(crate) fn next() -> Self {
        KeyId(NEXT_KEY_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "key_{}", self.0)
    }
}

/// A scalar property of an entity type
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub store_generated: bool,
}

impl Property {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            store_generated: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the property as filled in by the store / value generator.
    /// Store-generated properties are implicitly required.
    pub fn store_generated(mut self) -> Self {
        self.store_generated = true;
        self.nullable = false;
        self
    }
}

/// A candidate key: an ordered set of property slots on one entity type
#[derive(Debug, Clone)]
pub struct Key {
    id: KeyId,
    properties: Vec<usize>,
}

impl Key {
    pub(crate) fn new(properties: Vec<usize>) -> Self {
        Self {
            id: KeyId::next(),
            properties,
        }
    }

    pub fn id(&self) -> KeyId {
        self.id
    }

    pub fn properties(&self) -> &[usize] {
        &self.properties
    }

    pub fn arity(&self) -> usize {
        self.properties.len()
    }

    pub fn contains(&self, property: usize) -> bool {
        self.properties.contains(&property)
    }
}

/// Immutable description of one entity shape: scalar properties, the primary
/// key, alternate keys, and the foreign keys declared by this (dependent) type.
#[derive(Debug)]
pub struct EntityType {
    name: String,
    properties: Vec<Property>,
    primary_key: Key,
    alternate_keys: Vec<Key>,
    foreign_keys: Vec<ForeignKey>,
}

impl EntityType {
    pub(crate) fn new(
        name: String,
        properties: Vec<Property>,
        primary_key: Key,
        alternate_keys: Vec<Key>,
        foreign_keys: Vec<ForeignKey>,
    ) -> Self {
        Self {
            name,
            properties,
            primary_key,
            alternate_keys,
            foreign_keys,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, index: usize) -> Option<&Property> {
        self.properties.get(index)
    }

    pub fn find_property(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn primary_key(&self) -> &Key {
        &self.primary_key
    }

    pub fn alternate_keys(&self) -> &[Key] {
        &self.alternate_keys
    }

    /// All declared keys, primary first
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        std::iter::once(&self.primary_key).chain(self.alternate_keys.iter())
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }

    /// Keys that include the given property slot
    pub fn keys_containing(&self, property: usize) -> impl Iterator<Item = &Key> {
        self.keys().filter(move |k| k.contains(property))
    }
}

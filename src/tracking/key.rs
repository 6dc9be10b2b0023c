use crate::core::{Row, Value};
use crate::model::{Key, KeyId};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable, comparable value of one key definition for one instance.
///
/// `Invalid` means "cannot currently be computed" — some required component
/// is unset. Invalid values never enter the identity map. Two values are
/// equal iff they belong to the same key definition and their components are
/// componentwise equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum KeyValue {
    Invalid,
    Key {
        definition: KeyId,
        components: Vec<Value>,
    },
}

impl KeyValue {
    pub fn is_invalid(&self) -> bool {
        matches!(self, KeyValue::Invalid)
    }

    pub fn definition(&self) -> Option<KeyId> {
        match self {
            KeyValue::Invalid => None,
            KeyValue::Key { definition, .. } => Some(*definition),
        }
    }

    pub fn components(&self) -> &[Value] {
        match self {
            KeyValue::Invalid => &[],
            KeyValue::Key { components, .. } => components,
        }
    }
}

impl std::fmt::Display for KeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyValue::Invalid => write!(f, "<invalid>"),
            KeyValue::Key {
                definition,
                components,
            } => {
                write!(f, "{}(", definition)?;
                for (i, value) in components.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Builds `KeyValue`s for one key definition. Pure and deterministic.
#[derive(Debug)]
pub struct KeyValueFactory {
    definition: KeyId,
    properties: Vec<usize>,
}

impl KeyValueFactory {
    pub fn new(key: &Key) -> Self {
        Self {
            definition: key.id(),
            properties: key.properties().to_vec(),
        }
    }

    pub fn definition(&self) -> KeyId {
        self.definition
    }

    /// Build from raw components. Any NULL component, or an arity mismatch,
    /// yields the invalid value.
    pub fn create(&self, components: &[Value]) -> KeyValue {
        if components.len() != self.properties.len()
            || components.iter().any(Value::is_null)
        {
            return KeyValue::Invalid;
        }
        KeyValue::Key {
            definition: self.definition,
            components: components.to_vec(),
        }
    }

    /// Build from the key's own property slots of a full row
    pub fn from_row(&self, row: &Row) -> KeyValue {
        self.project(row, &self.properties)
    }

    /// Build from a dependent's foreign-key slots, bound to this (principal)
    /// key definition so dependent and principal values meet in the map.
    pub fn dependent_from_row(&self, row: &Row, fk_slots: &[usize]) -> KeyValue {
        if fk_slots.len() != self.properties.len() {
            return KeyValue::Invalid;
        }
        self.project(row, fk_slots)
    }

    fn project(&self, row: &Row, slots: &[usize]) -> KeyValue {
        let mut components = Vec::with_capacity(slots.len());
        for &slot in slots {
            match row.get(slot) {
                Some(value) if !value.is_null() => components.push(value.clone()),
                _ => return KeyValue::Invalid,
            }
        }
        KeyValue::Key {
            definition: self.definition,
            components,
        }
    }
}

/// One factory per key definition, cached by `KeyId`.
///
/// The cache is interior-mutable so lookup paths can stay shared; a tracking
/// session is single-threaded, so a `RefCell` is sufficient.
#[derive(Debug, Default)]
pub struct KeyValueFactorySource {
    factories: RefCell<HashMap<KeyId, Arc<KeyValueFactory>>>,
}

impl KeyValueFactorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self, key: &Key) -> Arc<KeyValueFactory> {
        self.factories
            .borrow_mut()
            .entry(key.id())
            .or_insert_with(|| Arc::new(KeyValueFactory::new(key)))
            .clone()
    }
}

use crate::core::{Result, Row, TrackError, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

/// A populated navigation slot on an instance: the principal side of a
/// unique relationship holds one dependent, a collection navigation holds many.
#[derive(Debug, Clone)]
pub enum Reference {
    One(Entity),
    Many(Vec<Entity>),
}

#[derive(Debug)]
struct EntityInner {
    entity_type: String,
    values: RwLock<Row>,
    references: RwLock<HashMap<String, Reference>>,
}

/// A caller-visible entity instance: a cheap-to-clone handle over one scalar
/// row plus populated navigation references.
///
/// Identity is pointer identity. Two handles are the same instance iff they
/// share the allocation; the tracking maps key on that address, never on the
/// row contents. The interior locks exist for interior mutability only — a
/// tracking session is single-threaded.
#[derive(Debug, Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

/// Stable identity-map key for one instance (its allocation address)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey(usize);

/// Non-owning handle used by the detached reference map
#[derive(Debug, Clone)]
pub struct WeakEntity {
    inner: Weak<EntityInner>,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>, values: Row) -> Self {
        Self {
            inner: Arc::new(EntityInner {
                entity_type: entity_type.into(),
                values: RwLock::new(values),
                references: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn entity_type_name(&self) -> &str {
        &self.inner.entity_type
    }

    pub fn key(&self) -> EntityKey {
        EntityKey(Arc::as_ptr(&self.inner) as usize)
    }

    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakEntity {
        WeakEntity {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn value(&self, index: usize) -> Result<Value> {
        let values = self.inner.values.read()?;
        values.get(index).cloned().ok_or_else(|| {
            TrackError::PropertyOutOfRange {
                entity_type: self.inner.entity_type.clone(),
                index,
            }
        })
    }

    pub fn values(&self) -> Result<Row> {
        Ok(self.inner.values.read()?.clone())
    }

    pub(crate) fn set_value(&self, index: usize, value: Value) -> Result<()> {
        let mut values = self.inner.values.write()?;
        match values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(TrackError::PropertyOutOfRange {
                entity_type: self.inner.entity_type.clone(),
                index,
            }),
        }
    }

    pub fn reference(&self, navigation: &str) -> Result<Option<Reference>> {
        Ok(self.inner.references.read()?.get(navigation).cloned())
    }

    /// Populate a navigation slot. Navigation values only steer dependent
    /// resolution; they never enter the identity map.
    pub fn set_reference(&self, navigation: impl Into<String>, reference: Reference) -> Result<()> {
        self.inner
            .references
            .write()?
            .insert(navigation.into(), reference);
        Ok(())
    }

    pub fn clear_reference(&self, navigation: &str) -> Result<()> {
        self.inner.references.write()?.remove(navigation);
        Ok(())
    }
}

impl WeakEntity {
    pub fn upgrade(&self) -> Option<Entity> {
        self.inner.upgrade().map(|inner| Entity { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_pointer_identity() {
        let a = Entity::new("User", vec![Value::Integer(1)]);
        let b = Entity::new("User", vec![Value::Integer(1)]);
        assert_ne!(a.key(), b.key());
        assert_eq!(a.key(), a.clone().key());
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_value_round_trip() {
        let entity = Entity::new("User", vec![Value::Integer(1), Value::Null]);
        entity.set_value(1, Value::Text("x".into())).unwrap();
        assert_eq!(entity.value(1).unwrap(), Value::Text("x".into()));
        assert!(entity.value(2).is_err());
    }

    #[test]
    fn test_weak_handle_dies_with_instance() {
        let entity = Entity::new("User", vec![]);
        let weak = entity.downgrade();
        assert!(weak.is_alive());
        drop(entity);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }
}

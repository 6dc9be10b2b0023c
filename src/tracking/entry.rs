// ============================================================================
// Tracked Entry
// ============================================================================
//
// One Entry per tracked instance: lifecycle state, the original-values
// snapshot, conceptual-null markers, and the sidecar that lets a failed save
// revert speculative store-generated values.
//
// Entries live in the owning StateManager's arena and are addressed through
// EntryId handles; an Entry holds its instance weakly, the manager's live
// reference map holds the strong pin while the entry is tracked.
//
// ============================================================================

use crate::core::{Result, Row, TrackError, Value};
use crate::model::{EntityType, ForeignKey};
use crate::store::ValueGenerator;
use crate::tracking::entity::{Entity, EntityKey, WeakEntity};
use crate::tracking::key::{KeyValue, KeyValueFactory};
use crate::tracking::snapshot::Snapshot;
use crate::tracking::state::EntityState;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global state manager counter
static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a state manager instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagerId(u64);

impl ManagerId {
    pub(crate) fn next() -> Self {
        ManagerId(NEXT_MANAGER_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl std::fmt::Display for ManagerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mgr_{}", self.0)
    }
}

/// Stable handle to an entry in one manager's arena.
///
/// Carries the minting manager's id so that handles cannot silently cross
/// manager boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId {
    manager: ManagerId,
    index: usize,
}

impl EntryId {
    pub(crate) fn new(manager: ManagerId, index: usize) -> Self {
        Self { manager, index }
    }

    pub fn manager(&self) -> ManagerId {
        self.manager
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entry_{}_{}", self.manager.0, self.index)
    }
}

/// Which snapshot a key computation reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Current,
    Original,
}

/// The unit of tracking: one instance plus its metadata, lifecycle state,
/// snapshots and conceptual-null markers.
#[derive(Debug)]
pub struct Entry {
    id: EntryId,
    entity_type: Arc<EntityType>,
    entity: WeakEntity,
    entity_key: EntityKey,
    state: EntityState,
    original: Snapshot,
    /// Pre-generation values for slots written during prepare-to-save;
    /// restored wholesale when the save fails.
    generated: Vec<Option<Value>>,
    conceptual_nulls: BTreeSet<usize>,
    subscribed: bool,
}

impl Entry {
    fn raw(id: EntryId, entity_type: Arc<EntityType>, entity: &Entity, original: Snapshot) -> Self {
        Self {
            id,
            entity_key: entity.key(),
            entity: entity.downgrade(),
            entity_type,
            state: EntityState::Detached,
            original,
            generated: Vec::new(),
            conceptual_nulls: BTreeSet::new(),
            subscribed: false,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub(crate) fn entity_key(&self) -> EntityKey {
        self.entity_key
    }

    pub(crate) fn is_reachable(&self) -> bool {
        self.entity.is_alive()
    }

    /// The tracked instance. Fails for a detached entry whose instance has
    /// been dropped by the caller and not yet swept.
    pub fn entity(&self) -> Result<Entity> {
        self.entity
            .upgrade()
            .ok_or_else(|| TrackError::InstanceReclaimed(self.id.to_string()))
    }

    pub fn current_value(&self, index: usize) -> Result<Value> {
        self.check_index(index)?;
        self.entity()?.value(index)
    }

    pub fn original_value(&self, index: usize) -> Result<Value> {
        self.check_index(index)?;
        match self.original.get(index) {
            Some(value) => Ok(value.clone()),
            // Before the snapshot is captured the original IS the current row.
            None => self.current_value(index),
        }
    }

    pub fn value(&self, index: usize, source: ValueSource) -> Result<Value> {
        match source {
            ValueSource::Current => self.current_value(index),
            ValueSource::Original => self.original_value(index),
        }
    }

    pub fn current_row(&self) -> Result<Row> {
        self.entity()?.values()
    }

    pub fn original_row(&self) -> Result<Row> {
        if self.original.is_empty() {
            self.current_row()
        } else {
            Ok(self.original.values().to_vec())
        }
    }

    pub(crate) fn set_current_value(&mut self, index: usize, value: Value) -> Result<()> {
        self.check_index(index)?;
        let property = &self.entity_type.properties()[index];
        if value.is_null() && !property.nullable {
            // Logically unset; resolution is deferred until save time.
            self.conceptual_nulls.insert(index);
        } else {
            self.conceptual_nulls.remove(&index);
        }
        self.entity()?.set_value(index, value)
    }

    pub fn has_conceptual_null(&self) -> bool {
        !self.conceptual_nulls.is_empty()
    }

    pub(crate) fn conceptual_nulls(&self) -> impl Iterator<Item = usize> + '_ {
        self.conceptual_nulls.iter().copied()
    }

    /// Key value for one of this type's own keys
    pub fn key_value(&self, factory: &KeyValueFactory, source: ValueSource) -> Result<KeyValue> {
        let row = match source {
            ValueSource::Current => self.current_row()?,
            ValueSource::Original => self.original_row()?,
        };
        Ok(factory.from_row(&row))
    }

    /// Foreign-key value on the dependent side, bound to the principal key
    pub fn dependent_key_value(
        &self,
        factory: &KeyValueFactory,
        foreign_key: &ForeignKey,
        source: ValueSource,
    ) -> Result<KeyValue> {
        let row = match source {
            ValueSource::Current => self.current_row()?,
            ValueSource::Original => self.original_row()?,
        };
        Ok(factory.dependent_from_row(&row, foreign_key.properties()))
    }

    pub(crate) fn set_state(&mut self, to: EntityState) -> Result<()> {
        if !self.state.can_transition(to) {
            return Err(TrackError::InvalidTransition {
                entity_type: self.entity_type.name().to_string(),
                from: self.state.as_str(),
                to: to.as_str(),
            });
        }
        self.state = to;
        Ok(())
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub(crate) fn capture_snapshot(&mut self) -> Result<()> {
        if self.original.is_empty() {
            let row = self.current_row()?;
            self.original.reset(&row);
        }
        self.subscribed = true;
        Ok(())
    }

    /// Finalize the entry for inclusion in a save: fill unset store-generated
    /// slots through the value generator (recording the sidecar) and validate
    /// that every required property has a value.
    pub(crate) fn prepare_to_save(&mut self, generator: &dyn ValueGenerator) -> Result<()> {
        self.generated = vec![None; self.entity_type.property_count()];

        if self.state == EntityState::Deleted {
            return Ok(());
        }

        for index in 0..self.entity_type.property_count() {
            let current = self.current_value(index)?;
            let property = &self.entity_type.properties()[index];
            if current.is_null() && property.store_generated {
                let value = generator.generate(&self.entity_type, property)?;
                self.entity()?.set_value(index, value)?;
                self.generated[index] = Some(current);
                self.conceptual_nulls.remove(&index);
            }
        }

        for (index, property) in self.entity_type.properties().iter().enumerate() {
            if !property.nullable && self.current_value(index)?.is_null() {
                return Err(TrackError::ConceptualNull {
                    entity_type: self.entity_type.name().to_string(),
                    property: property.name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Revert every value written speculatively by `prepare_to_save`
    pub(crate) fn discard_store_generated(&mut self) -> Result<()> {
        let generated = std::mem::take(&mut self.generated);
        for (index, previous) in generated.into_iter().enumerate() {
            if let Some(previous) = previous {
                let required = !self.entity_type.properties()[index].nullable;
                if previous.is_null() && required {
                    self.conceptual_nulls.insert(index);
                }
                self.entity()?.set_value(index, previous)?;
            }
        }
        Ok(())
    }

    /// Post-save bookkeeping for a surviving entry: state back to Unchanged,
    /// snapshot reset to current values, sidecar cleared.
    pub(crate) fn accept_changes(&mut self) -> Result<()> {
        self.set_state(EntityState::Unchanged)?;
        let row = self.current_row()?;
        self.original.reset(&row);
        self.generated.clear();
        self.conceptual_nulls.clear();
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.entity_type.property_count() {
            return Err(TrackError::PropertyOutOfRange {
                entity_type: self.entity_type.name().to_string(),
                index,
            });
        }
        Ok(())
    }
}

/// Constructs raw entries for a manager
#[derive(Debug, Default)]
pub struct EntryFactory;

impl EntryFactory {
    pub fn new() -> Self {
        Self
    }

    /// Entry for an application-supplied instance; the snapshot is captured
    /// later by the subscriber.
    pub fn create(&self, id: EntryId, entity_type: Arc<EntityType>, entity: &Entity) -> Entry {
        Entry::raw(id, entity_type, entity, Snapshot::empty())
    }

    /// Entry for a query-materialized instance; the value buffer becomes the
    /// original-values snapshot.
    pub fn create_from_buffer(
        &self,
        id: EntryId,
        entity_type: Arc<EntityType>,
        entity: &Entity,
        buffer: &[Value],
    ) -> Entry {
        Entry::raw(id, entity_type, entity, Snapshot::capture(buffer))
    }
}

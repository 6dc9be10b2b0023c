// ============================================================================
// State Manager
// ============================================================================
//
// The root coordinator of a tracking session. Owns the entry arena, the
// identity map (key value -> entry), the live reference map (instance ->
// entry, strong) and the detached reference map (instance -> entry, weak),
// and orchestrates the save protocol against the Database collaborator.
//
// One manager is one single-threaded session; the maps have no internal
// locking and must not be shared across threads mid-mutation.
//
// ============================================================================

use crate::core::{Result, TrackError, Value};
use crate::model::{DeleteBehavior, EntityType, ForeignKey, Key, Model};
use crate::store::{Database, SaveUnit, StandardValueGenerator, ValueGenerator};
use crate::tracking::config::TrackingOptions;
use crate::tracking::entity::{Entity, EntityKey, Reference};
use crate::tracking::entry::{Entry, EntryFactory, EntryId, ManagerId, ValueSource};
use crate::tracking::key::{KeyValue, KeyValueFactorySource};
use crate::tracking::state::EntityState;
use crate::tracking::subscriber::{EntrySubscriber, SnapshotSubscriber};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Slot storage for entries with stable indices and slot reuse.
///
/// Detachment leaves the slot in place; the detached-map sweep reclaims
/// slots whose instance is gone, which is the explicit-compaction analogue
/// of collector-observed reachability.
#[derive(Debug, Default)]
struct EntryArena {
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
}

impl EntryArena {
    fn next_index(&self) -> usize {
        self.free.last().copied().unwrap_or(self.slots.len())
    }

    fn insert(&mut self, entry: Entry) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(entry);
                index
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        }
    }

    fn get(&self, index: usize) -> Option<&Entry> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut Entry> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    fn remove(&mut self, index: usize) -> Option<Entry> {
        let entry = self.slots.get_mut(index).and_then(Option::take);
        if entry.is_some() {
            self.free.push(index);
        }
        entry
    }
}

/// Lower-level change tracking services used by higher-level facades and
/// other parts of the system.
pub struct StateManager {
    id: ManagerId,
    model: Model,
    options: TrackingOptions,
    factory: EntryFactory,
    subscriber: Box<dyn EntrySubscriber>,
    generator: Box<dyn ValueGenerator>,
    database: Arc<dyn Database>,
    key_factories: KeyValueFactorySource,
    arena: EntryArena,
    identity_map: HashMap<KeyValue, EntryId>,
    entity_refs: HashMap<EntityKey, (Entity, EntryId)>,
    detached_refs: HashMap<EntityKey, EntryId>,
    detached_insertions: usize,
    single_query_mode: Option<bool>,
}

impl StateManager {
    pub fn new(model: Model, database: Arc<dyn Database>) -> Self {
        Self::with_collaborators(
            model,
            database,
            Box::new(SnapshotSubscriber::new()),
            Box::new(StandardValueGenerator::new()),
            TrackingOptions::default(),
        )
    }

    pub fn with_collaborators(
        model: Model,
        database: Arc<dyn Database>,
        subscriber: Box<dyn EntrySubscriber>,
        generator: Box<dyn ValueGenerator>,
        options: TrackingOptions,
    ) -> Self {
        Self {
            id: ManagerId::next(),
            model,
            options,
            factory: EntryFactory::new(),
            subscriber,
            generator,
            database,
            key_factories: KeyValueFactorySource::new(),
            arena: EntryArena::default(),
            identity_map: HashMap::new(),
            entity_refs: HashMap::new(),
            detached_refs: HashMap::new(),
            detached_insertions: 0,
            single_query_mode: None,
        }
    }

    pub fn id(&self) -> ManagerId {
        self.id
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Compute a key value through the cached per-key factory
    pub fn create_key(&self, key: &Key, components: &[Value]) -> KeyValue {
        self.key_factories.factory(key).create(components)
    }

    pub fn entry(&self, id: EntryId) -> Result<&Entry> {
        if id.manager() != self.id {
            return Err(TrackError::ForeignManager(id.manager().to_string()));
        }
        self.arena
            .get(id.index())
            .ok_or_else(|| TrackError::UnknownEntry(id.to_string()))
    }

    fn entry_mut(&mut self, id: EntryId) -> Result<&mut Entry> {
        if id.manager() != self.id {
            return Err(TrackError::ForeignManager(id.manager().to_string()));
        }
        self.arena
            .get_mut(id.index())
            .ok_or_else(|| TrackError::UnknownEntry(id.to_string()))
    }

    /// Entries currently tracked in a non-Detached state
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entity_refs
            .values()
            .filter_map(move |(_, id)| self.arena.get(id.index()))
    }

    pub fn tracked_count(&self) -> usize {
        self.entity_refs.len()
    }

    /// Detached entries currently retained for identity stability
    pub fn detached_count(&self) -> usize {
        self.detached_refs.len()
    }

    // ------------------------------------------------------------------
    // Entry acquisition
    // ------------------------------------------------------------------

    /// The entry for an already-seen instance, live or detached
    pub fn try_get_entry(&self, entity: &Entity) -> Option<EntryId> {
        let key = entity.key();
        if let Some((_, id)) = self.entity_refs.get(&key) {
            return Some(*id);
        }
        if let Some(&id) = self.detached_refs.get(&key) {
            // Addresses can be reused after the original instance dies, so a
            // detached hit only counts when the handles are the same allocation.
            if let Some(entry) = self.arena.get(id.index()) {
                if let Ok(tracked) = entry.entity() {
                    if tracked.ptr_eq(entity) {
                        return Some(id);
                    }
                }
            }
        }
        None
    }

    pub fn try_get_entry_by_key(&self, key_value: &KeyValue) -> Option<EntryId> {
        if key_value.is_invalid() {
            return None;
        }
        self.identity_map.get(key_value).copied()
    }

    /// Returns the existing entry for the instance or creates a new one in
    /// the Detached state, registered only in the detached reference map.
    pub fn get_or_create_entry(&mut self, entity: &Entity) -> Result<EntryId> {
        if let Some(id) = self.try_get_entry(entity) {
            return Ok(id);
        }

        self.single_query_mode = Some(false);

        let entity_type = self
            .model
            .find_entity_type(entity.entity_type_name())
            .ok_or_else(|| TrackError::UnmappedType(entity.entity_type_name().to_string()))?;

        let id = EntryId::new(self.id, self.arena.next_index());
        let mut entry = self.factory.create(id, entity_type, entity);
        self.subscriber.snapshot_and_subscribe(&mut entry)?;
        let index = self.arena.insert(entry);
        debug_assert_eq!(index, id.index());

        self.record_detached(entity.key(), id);
        debug!("{} created {} for {}", self.id, id, entity.entity_type_name());
        Ok(id)
    }

    /// First query arms single-query mode; a second query disarms it
    pub fn begin_tracking_query(&mut self) {
        self.single_query_mode = Some(self.single_query_mode.is_none());
    }

    pub fn single_query_mode(&self) -> Option<bool> {
        self.single_query_mode
    }

    /// Start tracking a query-materialized instance in the Unchanged state.
    /// Idempotent for an already-tracked instance.
    pub fn start_tracking_from_query(
        &mut self,
        entity_type: Arc<EntityType>,
        entity: &Entity,
        value_buffer: &[Value],
    ) -> Result<EntryId> {
        if let Some(existing) = self.try_get_entry(entity) {
            return Ok(existing);
        }

        let id = EntryId::new(self.id, self.arena.next_index());
        let mut entry =
            self.factory
                .create_from_buffer(id, entity_type.clone(), entity, value_buffer);

        let primary = self.key_factories.factory(entity_type.primary_key());
        let key_value = entry.key_value(&primary, ValueSource::Current)?;
        if key_value.is_invalid() {
            return Err(TrackError::InvalidKey(entity_type.name().to_string()));
        }
        if self.identity_map.contains_key(&key_value) {
            return Err(TrackError::IdentityConflict(entity_type.name().to_string()));
        }

        self.subscriber.snapshot_and_subscribe(&mut entry)?;
        entry.set_state(EntityState::Unchanged)?;
        let index = self.arena.insert(entry);
        debug_assert_eq!(index, id.index());

        self.add_to_identity_map(&entity_type, key_value, id)?;
        self.entity_refs.insert(entity.key(), (entity.clone(), id));
        self.detached_refs.remove(&entity.key());

        debug!("{} tracking {} as UNCHANGED", self.id, id);
        Ok(id)
    }

    /// Attach an entry minted by this manager (the Added flow). Validates
    /// object identity and key identity the same way as query tracking.
    pub fn start_tracking(&mut self, id: EntryId) -> Result<EntryId> {
        let (entity, entity_type, key_value) = {
            let entry = self.entry(id)?;
            let entity = entry.entity()?;
            let entity_type = entry.entity_type().clone();
            let primary = self.key_factories.factory(entity_type.primary_key());
            let key_value = entry.key_value(&primary, ValueSource::Current)?;
            (entity, entity_type, key_value)
        };

        match self.try_get_entry(&entity) {
            None => {}
            Some(existing) if existing == id => {}
            Some(_) => {
                return Err(TrackError::DuplicateEntry(entity_type.name().to_string()));
            }
        }
        self.entity_refs.insert(entity.key(), (entity.clone(), id));
        self.detached_refs.remove(&entity.key());

        if key_value.is_invalid() {
            return Err(TrackError::InvalidKey(entity_type.name().to_string()));
        }

        match self.identity_map.get(&key_value) {
            Some(&existing) if existing != id => {
                return Err(TrackError::IdentityConflict(entity_type.name().to_string()));
            }
            Some(_) => {} // idempotent re-registration
            None => self.add_to_identity_map(&entity_type, key_value, id)?,
        }

        Ok(id)
    }

    /// Stop tracking: live map slot out, weak detached slot in, and every
    /// identity slot owned by this exact entry removed.
    pub fn stop_tracking(&mut self, id: EntryId) -> Result<()> {
        let (entity_key, owned_keys) = {
            let entry = self.entry(id)?;
            let entity_key = entry.entity_key();
            let mut owned = Vec::new();
            if let Ok(row) = entry.current_row() {
                for key in entry.entity_type().keys() {
                    let key_value = self.key_factories.factory(key).from_row(&row);
                    if !key_value.is_invalid() {
                        owned.push(key_value);
                    }
                }
            }
            (entity_key, owned)
        };

        self.entity_refs.remove(&entity_key);
        for key_value in owned_keys {
            // A later conflict may have handed the slot to another entry;
            // such slots are left untouched.
            if self.identity_map.get(&key_value) == Some(&id) {
                self.identity_map.remove(&key_value);
            }
        }

        self.entry_mut(id)?.set_state(EntityState::Detached)?;
        debug!("{} detached {}", self.id, id);
        self.record_detached(entity_key, id);
        Ok(())
    }

    /// Register a new instance for insertion: generates unset store-generated
    /// primary key components, then starts tracking in the Added state.
    pub fn add(&mut self, entity: &Entity) -> Result<EntryId> {
        let id = self.get_or_create_entry(entity)?;

        let entity_type = self.entry(id)?.entity_type().clone();
        for &slot in entity_type.primary_key().properties() {
            let current = self.entry(id)?.current_value(slot)?;
            let property = &entity_type.properties()[slot];
            if current.is_null() && property.store_generated {
                let value = self.generator.generate(&entity_type, property)?;
                self.entry_mut(id)?.set_current_value(slot, value)?;
            }
        }

        self.entry_mut(id)?.set_state(EntityState::Added)?;
        self.start_tracking(id)?;
        debug!("{} added {}", self.id, id);
        Ok(id)
    }

    /// Request removal. An Added entry was never persisted and simply
    /// detaches; tracked entries move to Deleted.
    pub fn delete(&mut self, id: EntryId) -> Result<()> {
        if self.entry(id)?.state() == EntityState::Added {
            self.stop_tracking(id)
        } else {
            self.entry_mut(id)?.set_state(EntityState::Deleted)
        }
    }

    // ------------------------------------------------------------------
    // Property access and identity map maintenance
    // ------------------------------------------------------------------

    pub fn get_property_value(&self, id: EntryId, index: usize) -> Result<Value> {
        self.entry(id)?.current_value(index)
    }

    pub fn get_original_value(&self, id: EntryId, index: usize) -> Result<Value> {
        self.entry(id)?.original_value(index)
    }

    /// Write one property through the tracker: records the modification,
    /// flips Unchanged entries to Modified, and keeps every key the property
    /// participates in consistent in the identity map.
    pub fn set_property_value(&mut self, id: EntryId, index: usize, value: Value) -> Result<()> {
        let (affected_keys, state) = {
            let entry = self.entry(id)?;
            let state = entry.state();
            let affected: Vec<(Key, KeyValue)> = if state.is_tracked() {
                let row = entry.current_row()?;
                entry
                    .entity_type()
                    .keys_containing(index)
                    .map(|key| (key.clone(), self.key_factories.factory(key).from_row(&row)))
                    .collect()
            } else {
                Vec::new()
            };
            (affected, state)
        };

        {
            let entry = self.entry_mut(id)?;
            entry.set_current_value(index, value)?;
            if state == EntityState::Unchanged {
                entry.set_state(EntityState::Modified)?;
            }
        }

        for (key, old_key_value) in affected_keys {
            self.update_identity_map(id, &old_key_value, &key)?;
        }
        Ok(())
    }

    /// Re-point the identity slot for one key after a key-bearing property
    /// changed. No-op for Detached entries and for unchanged key values.
    pub fn update_identity_map(
        &mut self,
        id: EntryId,
        old_key_value: &KeyValue,
        key: &Key,
    ) -> Result<()> {
        let entry = self.entry(id)?;
        if entry.state() == EntityState::Detached {
            return Ok(());
        }

        let factory = self.key_factories.factory(key);
        let new_key_value = entry.key_value(&factory, ValueSource::Current)?;
        if &new_key_value == old_key_value {
            return Ok(());
        }

        if let Some(&existing) = self.identity_map.get(&new_key_value) {
            if existing != id {
                return Err(TrackError::IdentityConflict(
                    entry.entity_type().name().to_string(),
                ));
            }
        }

        self.identity_map.remove(old_key_value);
        if !new_key_value.is_invalid() {
            self.identity_map.insert(new_key_value, id);
        }
        Ok(())
    }

    fn add_to_identity_map(
        &mut self,
        entity_type: &EntityType,
        primary_key_value: KeyValue,
        id: EntryId,
    ) -> Result<()> {
        self.identity_map.insert(primary_key_value, id);

        let row = self.entry(id)?.current_row()?;
        for key in entity_type.alternate_keys() {
            let key_value = self.key_factories.factory(key).from_row(&row);
            if !key_value.is_invalid() {
                self.identity_map.insert(key_value, id);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Relationship resolution
    // ------------------------------------------------------------------

    /// The tracked principal of a dependent, from current or original
    /// foreign-key values
    pub fn get_principal(
        &self,
        dependent: EntryId,
        foreign_key: &ForeignKey,
        source: ValueSource,
    ) -> Result<Option<EntryId>> {
        let entry = self.entry(dependent)?;
        let factory = self.key_factories.factory(foreign_key.principal_key());
        let key_value = entry.dependent_key_value(&factory, foreign_key, source)?;
        if key_value.is_invalid() {
            return Ok(None);
        }
        Ok(self.identity_map.get(&key_value).copied())
    }

    /// Lazy, restartable scan over tracked dependents of a principal.
    /// Linear in the tracked set; this path is not hot.
    pub fn get_dependents<'a>(
        &'a self,
        principal: EntryId,
        foreign_key: &'a ForeignKey,
    ) -> Result<impl Iterator<Item = EntryId> + 'a> {
        let entry = self.entry(principal)?;
        let factory = self.key_factories.factory(foreign_key.principal_key());
        let target = {
            let key_value = entry.key_value(&factory, ValueSource::Current)?;
            if key_value.is_invalid() {
                None
            } else {
                Some(key_value)
            }
        };

        Ok(self
            .entity_refs
            .values()
            .filter_map(move |(_, id)| self.arena.get(id.index()))
            .filter(move |candidate| {
                let Some(target) = target.as_ref() else {
                    return false;
                };
                if candidate.entity_type().name() != foreign_key.declaring_type() {
                    return false;
                }
                matches!(
                    candidate.dependent_key_value(&factory, foreign_key, ValueSource::Current),
                    Ok(key_value) if &key_value == target
                )
            })
            .map(Entry::id))
    }

    /// Resolve dependents through the populated principal-to-dependent
    /// navigation instead of scanning. `None` when the foreign key declares
    /// no navigation; untracked references are filtered out.
    pub fn get_dependents_from_navigation(
        &self,
        principal: EntryId,
        foreign_key: &ForeignKey,
    ) -> Result<Option<Vec<EntryId>>> {
        let Some(navigation) = foreign_key.principal_to_dependent() else {
            return Ok(None);
        };

        let entity = self.entry(principal)?.entity()?;
        let Some(reference) = entity.reference(navigation)? else {
            return Ok(Some(Vec::new()));
        };

        let resolved = match reference {
            Reference::One(dependent) => self.try_get_entry(&dependent).into_iter().collect(),
            Reference::Many(dependents) => dependents
                .iter()
                .filter_map(|dependent| self.try_get_entry(dependent))
                .collect(),
        };
        Ok(Some(resolved))
    }

    // ------------------------------------------------------------------
    // Save orchestration
    // ------------------------------------------------------------------

    /// Resolve conceptual nulls, cascade deletes, then collect and prepare
    /// every dirty entry. Resolution happens-before cascade happens-before
    /// collection.
    pub fn get_entries_to_save(&mut self) -> Result<Vec<EntryId>> {
        let with_nulls: Vec<EntryId> = self
            .entries()
            .filter(|entry| entry.has_conceptual_null())
            .map(Entry::id)
            .collect();
        for id in with_nulls {
            self.handle_conceptual_nulls(id)?;
        }

        let deleted: Vec<EntryId> = self
            .entries()
            .filter(|entry| entry.state() == EntityState::Deleted)
            .map(Entry::id)
            .collect();
        let mut visited = HashSet::new();
        for id in deleted {
            self.cascade_delete(id, &mut visited)?;
        }

        let dirty: Vec<EntryId> = self
            .entries()
            .filter(|entry| entry.state().is_dirty())
            .map(Entry::id)
            .collect();
        for &id in &dirty {
            let entry = self
                .arena
                .get_mut(id.index())
                .ok_or_else(|| TrackError::UnknownEntry(id.to_string()))?;
            entry.prepare_to_save(self.generator.as_ref())?;
        }
        Ok(dirty)
    }

    /// Persist pending changes synchronously. Returns the affected-row count
    /// reported by the database; 0 with no store round-trip when nothing is
    /// pending. A database failure discards speculative store-generated
    /// values before propagating.
    pub fn save_changes(&mut self, accept_all_changes_on_success: bool) -> Result<usize> {
        let to_save = self.get_entries_to_save()?;
        if to_save.is_empty() {
            return Ok(0);
        }
        let units = self.build_save_units(&to_save)?;
        info!("{} saving {} entries", self.id, units.len());

        match self.database.save_changes(&units) {
            Ok(affected) => {
                if accept_all_changes_on_success {
                    self.accept_entries(&to_save)?;
                }
                Ok(affected)
            }
            Err(err) => {
                warn!("{} save failed, reverting store-generated values", self.id);
                self.discard_entries(&to_save)?;
                Err(err)
            }
        }
    }

    /// Async variant of [`save_changes`](Self::save_changes). The database
    /// await is the only suspension point; a cancelled collaborator surfaces
    /// as an error and takes the same discard path.
    pub async fn save_changes_async(
        &mut self,
        accept_all_changes_on_success: bool,
    ) -> Result<usize> {
        let to_save = self.get_entries_to_save()?;
        if to_save.is_empty() {
            return Ok(0);
        }
        let units = self.build_save_units(&to_save)?;
        info!("{} saving {} entries", self.id, units.len());

        let database = Arc::clone(&self.database);
        match database.save_changes_async(&units).await {
            Ok(affected) => {
                if accept_all_changes_on_success {
                    self.accept_entries(&to_save)?;
                }
                Ok(affected)
            }
            Err(err) => {
                warn!("{} save failed, reverting store-generated values", self.id);
                self.discard_entries(&to_save)?;
                Err(err)
            }
        }
    }

    /// Post-save bookkeeping without a store round-trip, for callers that
    /// confirmed persistence independently.
    pub fn accept_all_changes(&mut self) -> Result<()> {
        let dirty: Vec<EntryId> = self
            .entries()
            .filter(|entry| entry.state().is_dirty())
            .map(Entry::id)
            .collect();
        self.accept_entries(&dirty)
    }

    fn build_save_units(&self, ids: &[EntryId]) -> Result<Vec<SaveUnit>> {
        ids.iter()
            .map(|id| {
                let entry = self.entry(*id)?;
                let factory = self.key_factories.factory(entry.entity_type().primary_key());
                Ok(SaveUnit {
                    entity_type: entry.entity_type().name().to_string(),
                    state: entry.state(),
                    key: entry.key_value(&factory, ValueSource::Current)?,
                    row: entry.current_row()?,
                    original: entry.original_row()?,
                })
            })
            .collect()
    }

    fn accept_entries(&mut self, ids: &[EntryId]) -> Result<()> {
        for &id in ids {
            let state = match self.arena.get(id.index()) {
                Some(entry) => entry.state(),
                None => continue,
            };
            match state {
                EntityState::Deleted => self.stop_tracking(id)?,
                EntityState::Added | EntityState::Modified => {
                    self.entry_mut(id)?.accept_changes()?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn discard_entries(&mut self, ids: &[EntryId]) -> Result<()> {
        for &id in ids {
            if let Some(entry) = self.arena.get_mut(id.index()) {
                entry.discard_store_generated()?;
            }
        }
        Ok(())
    }

    /// A conceptual null either defers to value generation, deletes an
    /// orphan whose required relationship was severed, or fails the save.
    fn handle_conceptual_nulls(&mut self, id: EntryId) -> Result<()> {
        let (entity_type, nulls, state) = {
            let entry = self.entry(id)?;
            (
                entry.entity_type().clone(),
                entry.conceptual_nulls().collect::<Vec<_>>(),
                entry.state(),
            )
        };
        if matches!(state, EntityState::Deleted | EntityState::Detached) {
            return Ok(());
        }

        for slot in nulls {
            let property = &entity_type.properties()[slot];
            if property.store_generated {
                continue;
            }
            let severed_required = entity_type
                .foreign_keys()
                .iter()
                .any(|fk| fk.is_required() && fk.contains(slot));
            if severed_required {
                debug!(
                    "{} deleting orphaned {} ('{}' unset)",
                    self.id,
                    entity_type.name(),
                    property.name
                );
                if state == EntityState::Added {
                    self.stop_tracking(id)?;
                } else {
                    self.entry_mut(id)?.set_state(EntityState::Deleted)?;
                }
                return Ok(());
            }
            return Err(TrackError::ConceptualNull {
                entity_type: entity_type.name().to_string(),
                property: property.name.clone(),
            });
        }
        Ok(())
    }

    /// Apply each referencing foreign key's delete behavior to the tracked
    /// dependents of a deleted principal.
    fn cascade_delete(&mut self, id: EntryId, visited: &mut HashSet<EntryId>) -> Result<()> {
        if !visited.insert(id) {
            return Ok(());
        }

        let principal_type = self.entry(id)?.entity_type().name().to_string();
        let referencing: Vec<ForeignKey> = self
            .model
            .referencing_foreign_keys(&principal_type)
            .map(|(_, fk)| fk.clone())
            .collect();

        for foreign_key in referencing {
            let dependents: Vec<EntryId> = self.get_dependents(id, &foreign_key)?.collect();
            for dependent in dependents {
                let dependent_state = self.entry(dependent)?.state();
                if dependent_state == EntityState::Deleted {
                    continue;
                }
                match foreign_key.on_delete() {
                    DeleteBehavior::Cascade => {
                        if dependent_state == EntityState::Added {
                            self.stop_tracking(dependent)?;
                        } else {
                            self.entry_mut(dependent)?.set_state(EntityState::Deleted)?;
                            self.cascade_delete(dependent, visited)?;
                        }
                    }
                    DeleteBehavior::SetNull => {
                        for &slot in foreign_key.properties() {
                            self.set_property_value(dependent, slot, Value::Null)?;
                        }
                    }
                    DeleteBehavior::Restrict => {
                        return Err(TrackError::RestrictViolation(principal_type.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Detached map maintenance
    // ------------------------------------------------------------------

    fn record_detached(&mut self, entity_key: EntityKey, id: EntryId) {
        self.detached_refs.insert(entity_key, id);
        self.detached_insertions += 1;
        if self.detached_insertions % self.options.cadence() == 0 {
            self.sweep_detached();
        }
    }

    /// Drop detached slots whose instance is gone and reclaim their arena
    /// slots. Bounds growth from repeated probing of short-lived instances.
    fn sweep_detached(&mut self) {
        let dead: Vec<EntityKey> = self
            .detached_refs
            .iter()
            .filter(|(_, id)| {
                self.arena
                    .get(id.index())
                    .is_none_or(|entry| !entry.is_reachable())
            })
            .map(|(key, _)| *key)
            .collect();
        if dead.is_empty() {
            return;
        }
        debug!("{} sweeping {} dead detached entries", self.id, dead.len());
        for key in dead {
            if let Some(id) = self.detached_refs.remove(&key) {
                self.arena.remove(id.index());
            }
        }
    }
}

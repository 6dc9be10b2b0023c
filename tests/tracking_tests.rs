/// Tracking tests
///
/// Entry acquisition, identity mapping and detachment.
/// Run with: cargo test --test tracking_tests
use rusttrackdb::tracking::SnapshotSubscriber;
use rusttrackdb::{
    DataType, Entity, EntityState, ForeignKeyDef, MemoryStore, Model, ModelBuilder, Property,
    StandardValueGenerator, StateManager, TrackError, TrackingOptions, Value, ValueSource,
};
use std::sync::Arc;

fn model() -> Model {
    let mut builder = ModelBuilder::new();
    builder
        .entity("User")
        .property(Property::new("id", DataType::Integer).store_generated())
        .property(Property::new("email", DataType::Text).not_null())
        .property(Property::new("name", DataType::Text))
        .primary_key(["id"])
        .alternate_key(["email"]);
    builder
        .entity("Post")
        .property(Property::new("id", DataType::Integer).store_generated())
        .property(Property::new("author_id", DataType::Integer))
        .property(Property::new("title", DataType::Text))
        .primary_key(["id"])
        .foreign_key(ForeignKeyDef::new(["author_id"], "User").navigation("posts"));
    builder.build().unwrap()
}

fn manager() -> StateManager {
    StateManager::new(model(), Arc::new(MemoryStore::new()))
}

fn user(id: i64, email: &str) -> Entity {
    Entity::new(
        "User",
        vec![
            Value::Integer(id),
            Value::Text(email.into()),
            Value::Null,
        ],
    )
}

fn track_user(manager: &mut StateManager, entity: &Entity) -> rusttrackdb::EntryId {
    let entity_type = manager.model().find_entity_type("User").unwrap();
    let buffer = entity.values().unwrap();
    manager
        .start_tracking_from_query(entity_type, entity, &buffer)
        .unwrap()
}

#[test]
fn test_start_tracking_with_distinct_keys() {
    let mut manager = manager();
    let users: Vec<Entity> = (1..=5).map(|i| user(i, &format!("u{}@x.io", i))).collect();
    let ids: Vec<_> = users.iter().map(|u| track_user(&mut manager, u)).collect();

    let entity_type = manager.model().find_entity_type("User").unwrap();
    for (i, id) in ids.iter().enumerate() {
        let key = manager.create_key(
            entity_type.primary_key(),
            &[Value::Integer(i as i64 + 1)],
        );
        assert_eq!(manager.try_get_entry_by_key(&key), Some(*id));
        assert_eq!(manager.entry(*id).unwrap().state(), EntityState::Unchanged);
    }
    assert_eq!(manager.tracked_count(), 5);
}

#[test]
fn test_identity_conflict_leaves_map_unchanged() {
    let mut manager = manager();
    let first = user(1, "a@x.io");
    let second = user(1, "b@x.io");

    let first_id = track_user(&mut manager, &first);

    let entity_type = manager.model().find_entity_type("User").unwrap();
    let buffer = second.values().unwrap();
    let err = manager
        .start_tracking_from_query(entity_type.clone(), &second, &buffer)
        .unwrap_err();
    assert!(matches!(err, TrackError::IdentityConflict(_)));

    let key = manager.create_key(entity_type.primary_key(), &[Value::Integer(1)]);
    assert_eq!(manager.try_get_entry_by_key(&key), Some(first_id));
    assert_eq!(manager.tracked_count(), 1);
}

#[test]
fn test_invalid_primary_key_rejected() {
    let mut manager = manager();
    let entity = Entity::new(
        "User",
        vec![Value::Null, Value::Text("a@x.io".into()), Value::Null],
    );
    let entity_type = manager.model().find_entity_type("User").unwrap();
    let buffer = entity.values().unwrap();
    let err = manager
        .start_tracking_from_query(entity_type, &entity, &buffer)
        .unwrap_err();
    assert!(matches!(err, TrackError::InvalidKey(_)));
}

#[test]
fn test_get_or_create_is_reference_stable() {
    let mut manager = manager();
    let entity = user(1, "a@x.io");

    let first = manager.get_or_create_entry(&entity).unwrap();
    let second = manager.get_or_create_entry(&entity).unwrap();
    assert_eq!(first, second);
    assert_eq!(manager.entry(first).unwrap().state(), EntityState::Detached);

    // A distinct instance with identical values is a distinct entry.
    let twin = user(1, "a@x.io");
    let third = manager.get_or_create_entry(&twin).unwrap();
    assert_ne!(first, third);
}

#[test]
fn test_unmapped_type_rejected() {
    let mut manager = manager();
    let entity = Entity::new("Order", vec![Value::Integer(1)]);
    let err = manager.get_or_create_entry(&entity).unwrap_err();
    assert!(matches!(err, TrackError::UnmappedType(_)));
}

#[test]
fn test_stop_tracking_preserves_logical_entry() {
    let mut manager = manager();
    let entity = user(1, "a@x.io");
    let id = track_user(&mut manager, &entity);

    manager.stop_tracking(id).unwrap();
    assert_eq!(manager.entry(id).unwrap().state(), EntityState::Detached);
    assert_eq!(manager.tracked_count(), 0);

    let entity_type = manager.model().find_entity_type("User").unwrap();
    let key = manager.create_key(entity_type.primary_key(), &[Value::Integer(1)]);
    assert_eq!(manager.try_get_entry_by_key(&key), None);

    // Probing the same live instance resolves through the detached map.
    let again = manager.get_or_create_entry(&entity).unwrap();
    assert_eq!(again, id);
}

#[test]
fn test_stop_tracking_leaves_conflicting_slots_alone() {
    let mut manager = manager();
    let first = user(1, "a@x.io");
    let first_id = track_user(&mut manager, &first);

    // Move the first entry's key away, then give the slot to a second entry.
    manager
        .set_property_value(first_id, 0, Value::Integer(9))
        .unwrap();
    let second = user(1, "b@x.io");
    let second_id = track_user(&mut manager, &second);

    // Detaching the second must not disturb the first entry's slots.
    manager.stop_tracking(second_id).unwrap();

    let entity_type = manager.model().find_entity_type("User").unwrap();
    let key = manager.create_key(entity_type.primary_key(), &[Value::Integer(9)]);
    assert_eq!(manager.try_get_entry_by_key(&key), Some(first_id));
}

#[test]
fn test_key_property_edit_moves_identity_slot() {
    let mut manager = manager();
    let entity = user(1, "a@x.io");
    let id = track_user(&mut manager, &entity);

    manager
        .set_property_value(id, 0, Value::Integer(2))
        .unwrap();

    let entity_type = manager.model().find_entity_type("User").unwrap();
    let old_key = manager.create_key(entity_type.primary_key(), &[Value::Integer(1)]);
    let new_key = manager.create_key(entity_type.primary_key(), &[Value::Integer(2)]);
    assert_eq!(manager.try_get_entry_by_key(&old_key), None);
    assert_eq!(manager.try_get_entry_by_key(&new_key), Some(id));
    assert_eq!(manager.entry(id).unwrap().state(), EntityState::Modified);
}

#[test]
fn test_alternate_key_edit_moves_identity_slot() {
    let mut manager = manager();
    let entity = user(1, "a@x.io");
    let id = track_user(&mut manager, &entity);

    let entity_type = manager.model().find_entity_type("User").unwrap();
    let alternate = &entity_type.alternate_keys()[0];

    let old_key = manager.create_key(alternate, &[Value::Text("a@x.io".into())]);
    assert_eq!(manager.try_get_entry_by_key(&old_key), Some(id));

    manager
        .set_property_value(id, 1, Value::Text("z@x.io".into()))
        .unwrap();

    let new_key = manager.create_key(alternate, &[Value::Text("z@x.io".into())]);
    assert_eq!(manager.try_get_entry_by_key(&old_key), None);
    assert_eq!(manager.try_get_entry_by_key(&new_key), Some(id));
}

#[test]
fn test_update_identity_map_is_noop_for_unchanged_key() {
    let mut manager = manager();
    let entity = user(1, "a@x.io");
    let id = track_user(&mut manager, &entity);

    let entity_type = manager.model().find_entity_type("User").unwrap();
    let key = manager.create_key(entity_type.primary_key(), &[Value::Integer(1)]);

    manager
        .update_identity_map(id, &key, entity_type.primary_key())
        .unwrap();
    assert_eq!(manager.try_get_entry_by_key(&key), Some(id));
    assert_eq!(manager.entry(id).unwrap().state(), EntityState::Unchanged);
}

#[test]
fn test_key_set_to_null_leaves_no_slot() {
    let mut manager = manager();
    let entity = user(1, "a@x.io");
    let id = track_user(&mut manager, &entity);

    manager.set_property_value(id, 0, Value::Null).unwrap();

    let entity_type = manager.model().find_entity_type("User").unwrap();
    let old_key = manager.create_key(entity_type.primary_key(), &[Value::Integer(1)]);
    assert_eq!(manager.try_get_entry_by_key(&old_key), None);
    assert!(manager.entry(id).unwrap().has_conceptual_null());
}

#[test]
fn test_key_edit_into_conflict_rejected() {
    let mut manager = manager();
    let first = user(1, "a@x.io");
    let second = user(2, "b@x.io");
    let _first_id = track_user(&mut manager, &first);
    let second_id = track_user(&mut manager, &second);

    let err = manager
        .set_property_value(second_id, 0, Value::Integer(1))
        .unwrap_err();
    assert!(matches!(err, TrackError::IdentityConflict(_)));
}

#[test]
fn test_non_key_edit_keeps_identity_map() {
    let mut manager = manager();
    let entity = user(1, "a@x.io");
    let id = track_user(&mut manager, &entity);

    manager
        .set_property_value(id, 2, Value::Text("Alice".into()))
        .unwrap();

    let entity_type = manager.model().find_entity_type("User").unwrap();
    let key = manager.create_key(entity_type.primary_key(), &[Value::Integer(1)]);
    assert_eq!(manager.try_get_entry_by_key(&key), Some(id));
    assert_eq!(manager.entry(id).unwrap().state(), EntityState::Modified);
    assert_eq!(manager.get_original_value(id, 2).unwrap(), Value::Null);
}

#[test]
fn test_entry_handles_do_not_cross_managers() {
    let mut first = manager();
    let mut second = manager();

    let entity = user(1, "a@x.io");
    let id = first.get_or_create_entry(&entity).unwrap();

    let err = second.start_tracking(id).unwrap_err();
    assert!(matches!(err, TrackError::ForeignManager(_)));
}

#[test]
fn test_reattach_resolves_same_entry() {
    let mut manager = manager();
    let entity = user(1, "a@x.io");
    let tracked = track_user(&mut manager, &entity);

    manager.stop_tracking(tracked).unwrap();
    let replacement = track_user(&mut manager, &entity);
    assert_eq!(replacement, tracked);
}

#[test]
fn test_detached_sweep_bounds_growth() {
    let mut manager = StateManager::with_collaborators(
        model(),
        Arc::new(MemoryStore::new()),
        Box::new(SnapshotSubscriber::new()),
        Box::new(StandardValueGenerator::new()),
        TrackingOptions::new().sweep_cadence(4),
    );

    // Short-lived instances dropped right after probing.
    for i in 0..8 {
        let entity = user(100 + i, &format!("temp{}@x.io", i));
        manager.get_or_create_entry(&entity).unwrap();
    }
    // Every dead handle seen by the last sweep is gone; at most one full
    // cadence of garbage can remain.
    assert!(manager.detached_count() <= 4);

    // A detached instance the caller still holds survives sweeps.
    let kept = user(1, "kept@x.io");
    manager.get_or_create_entry(&kept).unwrap();
    for i in 0..8 {
        let entity = user(200 + i, &format!("gone{}@x.io", i));
        manager.get_or_create_entry(&entity).unwrap();
    }
    assert!(manager.try_get_entry(&kept).is_some());
}

#[test]
fn test_single_query_mode_arms_and_disarms() {
    let mut manager = manager();
    assert_eq!(manager.single_query_mode(), None);

    manager.begin_tracking_query();
    assert_eq!(manager.single_query_mode(), Some(true));

    manager.begin_tracking_query();
    assert_eq!(manager.single_query_mode(), Some(false));
}

#[test]
fn test_ad_hoc_attach_disarms_single_query_mode() {
    let mut manager = manager();
    manager.begin_tracking_query();
    assert_eq!(manager.single_query_mode(), Some(true));

    let entity = user(1, "a@x.io");
    manager.get_or_create_entry(&entity).unwrap();
    assert_eq!(manager.single_query_mode(), Some(false));
}

#[test]
fn test_original_values_come_from_buffer() {
    let mut manager = manager();
    let entity = user(1, "a@x.io");
    let id = track_user(&mut manager, &entity);

    manager
        .set_property_value(id, 1, Value::Text("new@x.io".into()))
        .unwrap();

    let entry = manager.entry(id).unwrap();
    assert_eq!(
        entry.value(1, ValueSource::Original).unwrap(),
        Value::Text("a@x.io".into())
    );
    assert_eq!(
        entry.value(1, ValueSource::Current).unwrap(),
        Value::Text("new@x.io".into())
    );
}

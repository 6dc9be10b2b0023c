use crate::core::{Result, TrackError};
use crate::model::entity_type::{EntityType, Key, Property};
use crate::model::relation::{DeleteBehavior, ForeignKey};
use std::collections::HashMap;
use std::sync::Arc;

/// Finalized, read-only schema: entity types by name.
///
/// A `Model` is immutable for the lifetime of a tracking session and can be
/// shared between managers.
#[derive(Debug, Clone)]
pub struct Model {
    entity_types: Arc<HashMap<String, Arc<EntityType>>>,
}

impl Model {
    pub fn find_entity_type(&self, name: &str) -> Option<Arc<EntityType>> {
        self.entity_types.get(name).cloned()
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.entity_types.values()
    }

    /// Foreign keys anywhere in the model that reference the given principal type
    pub fn referencing_foreign_keys<'a>(
        &'a self,
        principal_type: &'a str,
    ) -> impl Iterator<Item = (&'a Arc<EntityType>, &'a ForeignKey)> {
        self.entity_types.values().flat_map(move |et| {
            et.foreign_keys()
                .iter()
                .filter(move |fk| fk.principal_type() == principal_type)
                .map(move |fk| (et, fk))
        })
    }
}

/// Declaration of a foreign key, resolved against the model at build time
#[derive(Debug, Clone)]
pub struct ForeignKeyDef {
    properties: Vec<String>,
    principal_type: String,
    principal_key: Option<Vec<String>>,
    required: bool,
    unique: bool,
    on_delete: DeleteBehavior,
    navigation: Option<String>,
}

impl ForeignKeyDef {
    pub fn new<I, S>(properties: I, principal_type: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            properties: properties.into_iter().map(Into::into).collect(),
            principal_type: principal_type.into(),
            principal_key: None,
            required: false,
            unique: false,
            on_delete: DeleteBehavior::Restrict,
            navigation: None,
        }
    }

    /// Reference an alternate key of the principal instead of its primary key
    pub fn principal_key<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.principal_key = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn on_delete(mut self, behavior: DeleteBehavior) -> Self {
        self.on_delete = behavior;
        self
    }

    /// Declare the navigation from the principal to the dependents
    pub fn navigation(mut self, name: impl Into<String>) -> Self {
        self.navigation = Some(name.into());
        self
    }
}

#[derive(Debug)]
struct EntityTypeDef {
    name: String,
    properties: Vec<Property>,
    primary_key: Vec<String>,
    alternate_keys: Vec<Vec<String>>,
    foreign_keys: Vec<ForeignKeyDef>,
}

/// Chained builder for one entity type
#[derive(Debug)]
pub struct EntityTypeBuilder {
    def: EntityTypeDef,
}

impl EntityTypeBuilder {
    pub fn property(&mut self, property: Property) -> &mut Self {
        self.def.properties.push(property);
        self
    }

    pub fn primary_key<I, S>(&mut self, properties: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.def.primary_key = properties.into_iter().map(Into::into).collect();
        self
    }

    pub fn alternate_key<I, S>(&mut self, properties: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.def
            .alternate_keys
            .push(properties.into_iter().map(Into::into).collect());
        self
    }

    pub fn foreign_key(&mut self, def: ForeignKeyDef) -> &mut Self {
        self.def.foreign_keys.push(def);
        self
    }
}

/// Assembles a `Model`, resolving property names to slots and foreign keys
/// to the keys they reference.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    entities: Vec<EntityTypeBuilder>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&mut self, name: impl Into<String>) -> &mut EntityTypeBuilder {
        self.entities.push(EntityTypeBuilder {
            def: EntityTypeDef {
                name: name.into(),
                properties: Vec::new(),
                primary_key: Vec::new(),
                alternate_keys: Vec::new(),
                foreign_keys: Vec::new(),
            },
        });
        self.entities.last_mut().unwrap()
    }

    pub fn build(self) -> Result<Model> {
        // First pass: properties and keys, so foreign keys can reference
        // any entity type regardless of declaration order.
        let mut keys: HashMap<String, (Key, Vec<Key>)> = HashMap::new();
        let mut prop_names: HashMap<String, Vec<String>> = HashMap::new();
        let mut defs: Vec<EntityTypeDef> = Vec::new();

        for builder in self.entities {
            let def = builder.def;
            if keys.contains_key(&def.name) {
                return Err(TrackError::Model(format!(
                    "Entity type '{}' is declared twice",
                    def.name
                )));
            }
            if def.primary_key.is_empty() {
                return Err(TrackError::Model(format!(
                    "Entity type '{}' has no primary key",
                    def.name
                )));
            }

            let primary = Key::new(Self::resolve_slots(&def, &def.primary_key)?);
            let mut alternates = Vec::new();
            for alt in &def.alternate_keys {
                alternates.push(Key::new(Self::resolve_slots(&def, alt)?));
            }

            keys.insert(def.name.clone(), (primary, alternates));
            prop_names.insert(
                def.name.clone(),
                def.properties.iter().map(|p| p.name.clone()).collect(),
            );
            defs.push(def);
        }

        // Second pass: resolve foreign keys against principal keys.
        let mut entity_types = HashMap::new();
        for def in defs {
            let mut foreign_keys = Vec::new();
            for fk in &def.foreign_keys {
                let (principal_primary, principal_alternates) =
                    keys.get(&fk.principal_type).ok_or_else(|| {
                        TrackError::Model(format!(
                            "Foreign key on '{}' references unknown type '{}'",
                            def.name, fk.principal_type
                        ))
                    })?;

                let principal_key = match &fk.principal_key {
                    None => principal_primary.clone(),
                    Some(names) => {
                        let principal_props = &prop_names[&fk.principal_type];
                        let slots: Vec<usize> = names
                            .iter()
                            .map(|name| {
                                principal_props.iter().position(|p| p == name).ok_or_else(|| {
                                    TrackError::Model(format!(
                                        "Unknown property '{}' on entity type '{}'",
                                        name, fk.principal_type
                                    ))
                                })
                            })
                            .collect::<Result<_>>()?;
                        std::iter::once(principal_primary)
                            .chain(principal_alternates.iter())
                            .find(|k| k.properties() == slots.as_slice())
                            .cloned()
                            .ok_or_else(|| {
                                TrackError::Model(format!(
                                    "No declared key of '{}' matches {:?}",
                                    fk.principal_type, names
                                ))
                            })?
                    }
                };

                let properties = Self::resolve_slots(&def, &fk.properties)?;
                if properties.len() != principal_key.arity() {
                    return Err(TrackError::Model(format!(
                        "Foreign key on '{}' has {} properties but the referenced key of '{}' has {}",
                        def.name,
                        properties.len(),
                        fk.principal_type,
                        principal_key.arity()
                    )));
                }

                foreign_keys.push(ForeignKey::new(
                    def.name.clone(),
                    properties,
                    fk.principal_type.clone(),
                    principal_key,
                    fk.required,
                    fk.unique,
                    fk.on_delete,
                    fk.navigation.clone(),
                ));
            }

            let (primary, alternates) = keys.get(&def.name).unwrap().clone();
            entity_types.insert(
                def.name.clone(),
                Arc::new(EntityType::new(
                    def.name,
                    def.properties,
                    primary,
                    alternates,
                    foreign_keys,
                )),
            );
        }

        Ok(Model {
            entity_types: Arc::new(entity_types),
        })
    }

    fn resolve_slots(def: &EntityTypeDef, names: &[String]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| {
                def.properties
                    .iter()
                    .position(|p| &p.name == name)
                    .ok_or_else(|| {
                        TrackError::Model(format!(
                            "Unknown property '{}' on entity type '{}'",
                            name, def.name
                        ))
                    })
            })
            .collect()
    }
}

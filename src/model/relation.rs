use crate::model::entity_type::Key;
use serde::{Deserialize, Serialize};

/// What happens to tracked dependents when their principal is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteBehavior {
    /// Dependents are deleted together with the principal
    Cascade,
    /// Dependent foreign key slots are set to NULL
    SetNull,
    /// The delete fails while tracked dependents remain
    Restrict,
}

/// A foreign key declared by a dependent entity type, pointing at a key
/// of the principal type.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    declaring_type: String,
    properties: Vec<usize>,
    principal_type: String,
    principal_key: Key,
    required: bool,
    unique: bool,
    on_delete: DeleteBehavior,
    principal_to_dependent: Option<String>,
}

impl ForeignKey {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        declaring_type: String,
        properties: Vec<usize>,
        principal_type: String,
        principal_key: Key,
        required: bool,
        unique: bool,
        on_delete: DeleteBehavior,
        principal_to_dependent: Option<String>,
    ) -> Self {
        Self {
            declaring_type,
            properties,
            principal_type,
            principal_key,
            required,
            unique,
            on_delete,
            principal_to_dependent,
        }
    }

    /// The dependent entity type that declares the foreign key
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// Foreign key property slots on the dependent
    pub fn properties(&self) -> &[usize] {
        &self.properties
    }

    pub fn principal_type(&self) -> &str {
        &self.principal_type
    }

    /// The referenced key on the principal
    pub fn principal_key(&self) -> &Key {
        &self.principal_key
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// One-to-one relationships resolve a single dependent per principal
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn on_delete(&self) -> DeleteBehavior {
        self.on_delete
    }

    /// Name of the navigation from the principal to its dependents, if declared
    pub fn principal_to_dependent(&self) -> Option<&str> {
        self.principal_to_dependent.as_deref()
    }

    pub fn contains(&self, property: usize) -> bool {
        self.properties.contains(&property)
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("No entity type is mapped for '{0}'")]
    UnmappedType(String),

    #[error("The primary key value for '{0}' cannot be computed because a key property is unset")]
    InvalidKey(String),

    #[error("Another entry for '{0}' is already tracked with the same key value")]
    IdentityConflict(String),

    #[error("A different entry is already tracked for this '{0}' instance")]
    DuplicateEntry(String),

    #[error("The entry belongs to a different state manager ({0})")]
    ForeignManager(String),

    #[error("Property '{property}' of '{entity_type}' is required but no value could be determined")]
    ConceptualNull {
        entity_type: String,
        property: String,
    },

    #[error("Invalid state transition for '{entity_type}': {from} -> {to}")]
    InvalidTransition {
        entity_type: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("Cannot delete '{0}': tracked dependents restrict the delete")]
    RestrictViolation(String),

    #[error("Property index {index} is out of range for '{entity_type}'")]
    PropertyOutOfRange { entity_type: String, index: usize },

    #[error("Entry {0} is no longer present in this state manager")]
    UnknownEntry(String),

    #[error("The instance tracked by {0} is no longer reachable")]
    InstanceReclaimed(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Value generation error: {0}")]
    ValueGeneration(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Store error: {0}")]
    Store(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TrackError>;

impl<T> From<std::sync::PoisonError<T>> for TrackError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<anyhow::Error> for TrackError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(err)
    }
}

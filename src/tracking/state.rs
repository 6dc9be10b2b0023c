// ============================================================================
// Entry Lifecycle States
// ============================================================================
//
// Implements the State Pattern for tracked-entry lifecycle management.
// Each entry moves through defined states; illegal transitions are rejected
// by the transition table rather than by convention.
//
// ============================================================================

use serde::{Deserialize, Serialize};

/// Lifecycle state of a tracked entry
///
/// State transitions:
/// ```text
/// Detached ──register──> Unchanged ──mutate──> Modified
///    │                       │                     │
///    └──add──> Added         └───────delete────────┴──> Deleted
///
/// Added/Modified ──accept──> Unchanged
/// any tracked state ──stop tracking──> Detached
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityState {
    /// Not registered with any state manager
    Detached,

    /// Tracked and identical to the stored row
    Unchanged,

    /// Tracked and pending insertion
    Added,

    /// Tracked with at least one changed property
    Modified,

    /// Tracked and pending removal from the store
    Deleted,
}

impl EntityState {
    /// Entries in a dirty state participate in the next save
    pub fn is_dirty(&self) -> bool {
        matches!(
            self,
            EntityState::Added | EntityState::Modified | EntityState::Deleted
        )
    }

    pub fn is_tracked(&self) -> bool {
        !matches!(self, EntityState::Detached)
    }

    /// Whether the transition table permits `self -> to`.
    /// Transitions to the current state are permitted no-ops.
    pub fn can_transition(self, to: EntityState) -> bool {
        use EntityState::*;

        if self == to {
            return true;
        }

        matches!(
            (self, to),
            (Detached, Unchanged)
                | (Detached, Added)
                | (Unchanged, Modified)
                | (Unchanged, Deleted)
                | (Unchanged, Detached)
                | (Modified, Unchanged)
                | (Modified, Deleted)
                | (Modified, Detached)
                | (Added, Unchanged)
                | (Added, Detached)
                | (Deleted, Detached)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityState::Detached => "DETACHED",
            EntityState::Unchanged => "UNCHANGED",
            EntityState::Added => "ADDED",
            EntityState::Modified => "MODIFIED",
            EntityState::Deleted => "DELETED",
        }
    }
}

impl std::fmt::Display for EntityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_transitions() {
        assert!(EntityState::Detached.can_transition(EntityState::Unchanged));
        assert!(EntityState::Detached.can_transition(EntityState::Added));
        assert!(!EntityState::Detached.can_transition(EntityState::Modified));
        assert!(!EntityState::Detached.can_transition(EntityState::Deleted));
    }

    #[test]
    fn test_mutation_and_delete_transitions() {
        assert!(EntityState::Unchanged.can_transition(EntityState::Modified));
        assert!(EntityState::Unchanged.can_transition(EntityState::Deleted));
        assert!(EntityState::Modified.can_transition(EntityState::Deleted));
        assert!(!EntityState::Deleted.can_transition(EntityState::Modified));
        assert!(!EntityState::Unchanged.can_transition(EntityState::Added));
    }

    #[test]
    fn test_accept_transitions() {
        assert!(EntityState::Added.can_transition(EntityState::Unchanged));
        assert!(EntityState::Modified.can_transition(EntityState::Unchanged));
        assert!(!EntityState::Deleted.can_transition(EntityState::Unchanged));
    }

    #[test]
    fn test_every_tracked_state_can_detach() {
        for state in [
            EntityState::Unchanged,
            EntityState::Added,
            EntityState::Modified,
            EntityState::Deleted,
        ] {
            assert!(state.can_transition(EntityState::Detached));
        }
    }

    #[test]
    fn test_self_transition_is_noop() {
        assert!(EntityState::Modified.can_transition(EntityState::Modified));
    }

    #[test]
    fn test_dirty_states() {
        assert!(EntityState::Added.is_dirty());
        assert!(EntityState::Modified.is_dirty());
        assert!(EntityState::Deleted.is_dirty());
        assert!(!EntityState::Unchanged.is_dirty());
        assert!(!EntityState::Detached.is_dirty());
    }
}

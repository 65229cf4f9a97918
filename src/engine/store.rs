//! # Mirror Store
//!
//! In-memory copy of the progress document; the single source of truth the
//! UI renders from.
//!
//! ## Features
//!
//! - **Optimistic Mutation**: Updates apply synchronously and never fail;
//!   the network save happens afterwards
//! - **Business Rules**: Invalid mutations are rejected before the document
//!   changes and before any network call
//! - **Snapshots**: Cheap cloned snapshots feed the save pipeline

use crate::engine::SyncError;
use crate::shared::progress::{PendingUpdate, ProgressDocument, UpdateAction};

/// Owns the live progress document for one session
#[derive(Debug, Default)]
pub struct MirrorStore {
    document: ProgressDocument,
}

impl MirrorStore {
    /// Create a store holding an empty document
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with an existing document
    pub fn from_document(document: ProgressDocument) -> Self {
        Self { document }
    }

    /// The live document
    pub fn document(&self) -> &ProgressDocument {
        &self.document
    }

    /// Cloned snapshot of the live document
    pub fn snapshot(&self) -> ProgressDocument {
        self.document.clone()
    }

    /// Replace the document wholesale (loads and merges)
    pub fn replace(&mut self, document: ProgressDocument) {
        self.document = document;
    }

    /// Check business rules for a mutation without applying it
    ///
    /// Completion can only be toggled while the item is on the learning
    /// path. Path toggles themselves are always allowed.
    pub fn validate(&self, update: &PendingUpdate) -> Result<(), SyncError> {
        if update.action == UpdateAction::MarkCompleted {
            let on_path = self
                .document
                .item(&update.item_id)
                .is_some_and(|item| item.added_to_path);
            if !on_path {
                return Err(SyncError::BusinessRule {
                    message: format!(
                        "cannot mark '{}' completed: item is not on the learning path",
                        update.item_id
                    ),
                });
            }
        }
        Ok(())
    }

    /// Apply a mutation and return the updated snapshot
    ///
    /// Optimistic: the caller renders the returned document immediately,
    /// independent of whether the network save later succeeds.
    pub fn apply_mutation(&mut self, update: &PendingUpdate) -> ProgressDocument {
        self.document.apply(update);
        tracing::debug!(
            "[Engine] Applied {} for '{}' (value={})",
            update.action.as_str(),
            update.item_id,
            update.value
        );
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_mark_completed_requires_path_membership() {
        let store = MirrorStore::new();
        let update = PendingUpdate::mark_completed("y", true);

        let err = store.validate(&update).unwrap_err();
        assert_matches!(err, SyncError::BusinessRule { .. });
        // Document untouched by a failed validation
        assert!(store.document().is_empty());
    }

    #[test]
    fn test_mark_completed_allowed_after_add() {
        let mut store = MirrorStore::new();
        store.apply_mutation(&PendingUpdate::add_to_path("x", true));

        let update = PendingUpdate::mark_completed("x", true);
        assert!(store.validate(&update).is_ok());

        let doc = store.apply_mutation(&update);
        let item = doc.item("x").unwrap();
        assert!(item.added_to_path);
        assert!(item.completed);
    }

    #[test]
    fn test_uncomplete_allowed_while_on_path() {
        let mut store = MirrorStore::new();
        store.apply_mutation(&PendingUpdate::add_to_path("x", true));
        store.apply_mutation(&PendingUpdate::mark_completed("x", true));

        assert!(store
            .validate(&PendingUpdate::mark_completed("x", false))
            .is_ok());
    }

    #[test]
    fn test_uncomplete_rejected_for_unknown_item() {
        let store = MirrorStore::new();
        let err = store
            .validate(&PendingUpdate::mark_completed("x", false))
            .unwrap_err();
        assert_matches!(err, SyncError::BusinessRule { .. });
    }

    #[test]
    fn test_completion_rejected_after_path_removal() {
        let mut store = MirrorStore::new();
        store.apply_mutation(&PendingUpdate::add_to_path("x", true));
        store.apply_mutation(&PendingUpdate::add_to_path("x", false));

        let err = store
            .validate(&PendingUpdate::mark_completed("x", true))
            .unwrap_err();
        assert_matches!(err, SyncError::BusinessRule { .. });
    }

    #[test]
    fn test_sequential_mutations_accumulate() {
        let mut store = MirrorStore::new();
        let updates = [
            PendingUpdate::add_to_path("a", true),
            PendingUpdate::add_to_path("b", true),
            PendingUpdate::mark_completed("a", true),
        ];
        for update in &updates {
            store.apply_mutation(update);
        }

        let doc = store.document();
        assert_eq!(doc.items.len(), 2);
        assert!(doc.item("a").unwrap().completed);
        assert!(!doc.item("b").unwrap().completed);
    }
}

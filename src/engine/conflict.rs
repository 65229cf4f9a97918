//! # Conflict Resolution
//!
//! Merges the locally held document with one arriving from a peer session
//! or a stale response racing newer local state.
//!
//! ## Merge Rule
//!
//! One consistent rule, applied per item id present in either document:
//!
//! 1. The item instance with the newer activity timestamp
//!    (`max(date_added, date_completed)`) wins.
//! 2. When only one instance has a usable timestamp, it wins.
//! 3. When neither has one, or they tie, the instance from the document with
//!    the newer `metadata.last_updated` wins (local on a tie).
//!
//! The merged metadata comes from the document with the newer
//! `metadata.last_updated`. Merging a document with itself is a no-op, so
//! redelivered peer documents are harmless.

use crate::shared::progress::{ProgressDocument, ProgressItem};

/// Result of merging a remote document into the local one
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The merged document
    pub document: ProgressDocument,
    /// True when the merge differs from the local input
    pub changed: bool,
    /// True when both inputs contributed items the other lacked or lost
    pub conflicting: bool,
}

/// Merge `remote` into `local`, item by item
pub fn merge_documents(local: &ProgressDocument, remote: &ProgressDocument) -> MergeOutcome {
    let local_meta_wins = document_level_local_wins(local, remote);

    let mut items: Vec<ProgressItem> = Vec::with_capacity(local.items.len().max(remote.items.len()));
    let mut kept_local = false;
    let mut kept_remote = false;

    // Local items keep their positions; remote instances replace them when
    // they carry newer activity.
    for local_item in &local.items {
        match remote.items.iter().find(|r| r.id == local_item.id) {
            Some(remote_item) => {
                if remote_wins(local_item, remote_item, local_meta_wins) {
                    if remote_item != local_item {
                        kept_remote = true;
                    }
                    items.push(remote_item.clone());
                } else {
                    if remote_item != local_item {
                        kept_local = true;
                    }
                    items.push(local_item.clone());
                }
            }
            None => {
                kept_local = true;
                items.push(local_item.clone());
            }
        }
    }

    // Items only the remote side knows about are appended in remote order
    for remote_item in &remote.items {
        if !local.items.iter().any(|l| l.id == remote_item.id) {
            kept_remote = true;
            items.push(remote_item.clone());
        }
    }

    let metadata = if local_meta_wins {
        local.metadata.clone()
    } else {
        remote.metadata.clone()
    };

    let document = ProgressDocument { items, metadata };
    let changed = document != *local;
    let conflicting = kept_local && kept_remote;

    if changed {
        tracing::debug!(
            "[Engine] Merge changed document: {} items, conflicting={}",
            document.items.len(),
            conflicting
        );
    }

    MergeOutcome {
        document,
        changed,
        conflicting,
    }
}

/// True when the local document's metadata is at least as new as the remote's
fn document_level_local_wins(local: &ProgressDocument, remote: &ProgressDocument) -> bool {
    match (local.metadata.last_updated, remote.metadata.last_updated) {
        (Some(l), Some(r)) => l >= r,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => true,
    }
}

/// Per-item winner selection; falls back to the document-level winner
fn remote_wins(local: &ProgressItem, remote: &ProgressItem, local_meta_wins: bool) -> bool {
    match (local.activity_timestamp(), remote.activity_timestamp()) {
        (Some(l), Some(r)) => {
            if r > l {
                true
            } else if l > r {
                false
            } else {
                !local_meta_wins
            }
        }
        (None, Some(_)) => true,
        (Some(_), None) => false,
        (None, None) => !local_meta_wins,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::progress::{PendingUpdate, ProgressDocument};
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn doc_with(updates: &[PendingUpdate]) -> ProgressDocument {
        let mut doc = ProgressDocument::new();
        for update in updates {
            doc.apply(update);
        }
        doc
    }

    #[test]
    fn test_merge_with_self_is_identity() {
        let doc = doc_with(&[
            PendingUpdate::add_to_path("a", true).with_timestamp(ts(10)),
            PendingUpdate::mark_completed("a", true).with_timestamp(ts(20)),
        ]);

        let outcome = merge_documents(&doc, &doc);
        assert!(!outcome.changed);
        assert!(!outcome.conflicting);
        assert_eq!(outcome.document, doc);
    }

    #[test]
    fn test_newer_remote_item_wins() {
        let local = doc_with(&[PendingUpdate::add_to_path("a", true).with_timestamp(ts(10))]);
        let remote = doc_with(&[
            PendingUpdate::add_to_path("a", true).with_timestamp(ts(10)),
            PendingUpdate::mark_completed("a", true).with_timestamp(ts(50)),
        ]);

        let outcome = merge_documents(&local, &remote);
        assert!(outcome.changed);
        let item = outcome.document.item("a").unwrap();
        assert!(item.completed);
        assert_eq!(item.date_completed, Some(ts(50)));
    }

    #[test]
    fn test_newer_local_item_survives() {
        let local = doc_with(&[PendingUpdate::add_to_path("a", true).with_timestamp(ts(90))]);
        let remote = doc_with(&[PendingUpdate::add_to_path("a", true).with_timestamp(ts(10))]);

        let outcome = merge_documents(&local, &remote);
        assert_eq!(
            outcome.document.item("a").unwrap().date_added,
            Some(ts(90))
        );
    }

    #[test]
    fn test_disjoint_items_union() {
        let local = doc_with(&[PendingUpdate::add_to_path("a", true).with_timestamp(ts(10))]);
        let remote = doc_with(&[PendingUpdate::add_to_path("b", true).with_timestamp(ts(20))]);

        let outcome = merge_documents(&local, &remote);
        assert!(outcome.changed);
        assert!(outcome.conflicting);
        assert_eq!(outcome.document.items.len(), 2);
        // Local order first, remote-only items appended
        assert_eq!(outcome.document.items[0].id, "a");
        assert_eq!(outcome.document.items[1].id, "b");
    }

    #[test]
    fn test_metadata_from_newer_document() {
        let local = doc_with(&[PendingUpdate::add_to_path("a", true).with_timestamp(ts(10))]);
        let remote = doc_with(&[PendingUpdate::add_to_path("b", true).with_timestamp(ts(99))]);

        let outcome = merge_documents(&local, &remote);
        assert_eq!(outcome.document.metadata.last_updated, Some(ts(99)));
    }

    #[test]
    fn test_timestampless_item_falls_back_to_document_winner() {
        // Both instances toggled off (no usable per-item timestamps); the
        // remote document is newer overall, so its instance wins.
        let local = doc_with(&[
            PendingUpdate::add_to_path("a", true).with_timestamp(ts(10)),
            PendingUpdate::add_to_path("a", false).with_timestamp(ts(20)),
        ]);
        let remote = doc_with(&[
            PendingUpdate::add_to_path("a", true).with_timestamp(ts(10)),
            PendingUpdate::add_to_path("a", false).with_timestamp(ts(30)),
            PendingUpdate::add_to_path("b", true).with_timestamp(ts(40)),
        ]);

        let outcome = merge_documents(&local, &remote);
        assert_eq!(outcome.document.metadata.last_updated, Some(ts(40)));
        assert!(!outcome.document.item("a").unwrap().added_to_path);
        assert!(outcome.document.item("b").unwrap().added_to_path);
    }

    #[test]
    fn test_one_sided_timestamp_wins() {
        // Local has recorded activity, remote instance has none
        let local = doc_with(&[PendingUpdate::add_to_path("a", true).with_timestamp(ts(10))]);
        let mut remote = doc_with(&[PendingUpdate::add_to_path("b", true).with_timestamp(ts(99))]);
        remote.items.push(crate::shared::progress::ProgressItem::new("a"));

        let outcome = merge_documents(&local, &remote);
        assert!(outcome.document.item("a").unwrap().added_to_path);
    }
}

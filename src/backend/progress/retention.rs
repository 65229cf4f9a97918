/**
 * Retention Sweep
 *
 * After every save the owner's files are pruned to the configured
 * retention limit: the most recently modified files survive, everything
 * older is deleted. Deletion failures are logged and never fail the save
 * that triggered the sweep.
 */

use crate::backend::progress::files::{Classification, FileStore};

/// Prune an owner's files down to `max_files`, newest kept
///
/// Returns the filenames that were deleted. Errors listing or deleting
/// are logged; the sweep reports what it managed to remove.
pub async fn sweep(store: &FileStore, class: &Classification, max_files: usize) -> Vec<String> {
    let files = match store.list_for_owner(class).await {
        Ok(files) => files,
        Err(e) => {
            tracing::error!(
                "[Server] Retention sweep could not list files for {}: {}",
                class.owner,
                e
            );
            return Vec::new();
        }
    };

    let mut deleted = Vec::new();
    for file in files.into_iter().skip(max_files) {
        match store.remove(&file.name).await {
            Ok(()) => deleted.push(file.name),
            Err(e) => {
                tracing::error!("[Server] Error deleting file {}: {}", file.name, e);
            }
        }
    }

    if !deleted.is_empty() {
        tracing::debug!(
            "[Server] Retention removed {} file(s) for {}",
            deleted.len(),
            class.owner
        );
    }

    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::progress::files::classify;
    use serde_json::json;

    fn kata_class(kata_id: &str) -> Classification {
        classify(&json!({
            "metadata": { "fileType": "kata-progress", "kataId": kata_id }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_sweep_keeps_the_newest_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        for i in 0..7 {
            store
                .write_value(
                    &format!("kata-progress-basics-2026-01-0{}T00-00-00-000Z.json", i + 1),
                    &json!({ "write": i }),
                )
                .await
                .unwrap();
            // Distinct modification times so the ordering is unambiguous.
            tokio::time::sleep(std::time::Duration::from_millis(15)).await;
        }

        let class = kata_class("basics");
        let deleted = sweep(&store, &class, 5).await;

        assert_eq!(deleted.len(), 2);
        let remaining = store.list_for_owner(&class).await.unwrap();
        assert_eq!(remaining.len(), 5);

        // The survivors are all newer than everything deleted.
        for name in &deleted {
            assert!(!remaining.iter().any(|file| &file.name == name));
        }
        assert!(deleted.contains(&"kata-progress-basics-2026-01-01T00-00-00-000Z.json".to_string()));
        assert!(deleted.contains(&"kata-progress-basics-2026-01-02T00-00-00-000Z.json".to_string()));
    }

    #[tokio::test]
    async fn test_sweep_under_limit_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store
            .write_value("kata-progress-basics-a.json", &json!({}))
            .await
            .unwrap();

        let deleted = sweep(&store, &kata_class("basics"), 5).await;
        assert!(deleted.is_empty());
        assert_eq!(
            store
                .list_for_owner(&kata_class("basics"))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_sweep_only_touches_the_owner() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());

        store
            .write_value("kata-progress-basics-a.json", &json!({}))
            .await
            .unwrap();
        store
            .write_value("kata-progress-advanced-a.json", &json!({}))
            .await
            .unwrap();

        let deleted = sweep(&store, &kata_class("basics"), 0).await;
        assert_eq!(deleted, vec!["kata-progress-basics-a.json".to_string()]);
        assert!(store.exists("kata-progress-advanced-a.json").await);
    }
}

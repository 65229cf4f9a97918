//! Shared helpers for the HTTP and end-to-end test suites

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};

use pathsync::backend::ServerConfig;

/// Server configuration rooted in a scratch directory
///
/// The polling fallback is slowed to a crawl so it never fires while a
/// test is running.
pub fn test_config(data_dir: &Path) -> ServerConfig {
    ServerConfig {
        data_dir: data_dir.to_path_buf(),
        poll_interval: Duration::from_secs(300),
        ..ServerConfig::default()
    }
}

/// Complete save request body for a kata progress document with one item
pub fn kata_save_body(kata_id: &str, item_id: &str) -> Value {
    json!({
        "items": [
            {
                "id": item_id,
                "addedToPath": true,
                "completed": false,
                "dateAdded": "2026-08-20T10:00:00Z"
            }
        ],
        "metadata": {
            "version": 1,
            "lastUpdated": "2026-08-20T10:00:00Z",
            "fileType": "kata-progress",
            "kataId": kata_id
        },
        "timestamp": "2026-08-20T10:00:00Z"
    })
}

//! Local cache migration integration tests.

mod common;

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use mystery_cafe_core::Table;
use mystery_cafe_service::migration::{Dataset, MigrationError, STATUS_KEY};
use mystery_cafe_service::{FileCache, LocalCache, MemoryCache, MigrationStatus, Migrator};
use mystery_cafe_store::{MemoryStore, Store};

fn cached() -> MemoryCache {
    MemoryCache::with_entries([
        (
            "mystery_cafe_stores",
            json!([
                {"id": "S1", "name": "Shibuya", "is_active": true},
                {"id": "S2", "name": "Shinjuku", "is_active": true}
            ]),
        ),
        (
            "mystery_cafe_staff",
            json!([
                {"id": "st-1", "name": "Kenji", "role": "gm", "store_ids": ["S1"], "is_active": true},
                {"name": "missing id"}
            ]),
        ),
        (
            // Cached the way the admin screens stored it: a JSON string.
            "mystery_cafe_scenarios",
            json!(r#"[{"id":"locked-library","title":"The Locked Library","duration_minutes":120,"min_players":3,"max_players":6,"base_price":3000,"is_active":true}]"#),
        ),
    ])
}

fn migrator(cache: Arc<dyn LocalCache>) -> (Migrator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Migrator::new(store.clone(), cache), store)
}

#[tokio::test]
async fn migrate_all_copies_every_dataset_once() {
    let cache = Arc::new(cached());
    let (migrator, store) = migrator(cache.clone());

    let reports = migrator.migrate_all().await.unwrap();
    assert_eq!(reports.len(), 4);

    let stores = reports.iter().find(|r| r.dataset == Dataset::Stores).unwrap();
    assert_eq!(stores.migrated, 2);
    let staff = reports.iter().find(|r| r.dataset == Dataset::Staff).unwrap();
    assert_eq!(staff.migrated, 1);
    assert_eq!(staff.rejected, 1);
    let inventory = reports
        .iter()
        .find(|r| r.dataset == Dataset::Inventory)
        .unwrap();
    assert_eq!(inventory.migrated, 0);

    assert_eq!(store.count_rows(Table::Stores).await.unwrap(), 2);
    assert_eq!(store.count_rows(Table::Scenarios).await.unwrap(), 1);
    assert_eq!(store.count_rows(Table::Staff).await.unwrap(), 1);

    // A missing cache key still completes the dataset.
    assert!(migrator.status().unwrap().is_complete());
    assert!(cache.get(STATUS_KEY).unwrap().is_some());
}

#[tokio::test]
async fn second_run_is_skipped() {
    let (migrator, store) = migrator(Arc::new(cached()));

    migrator.migrate_all().await.unwrap();
    let again = migrator.migrate_all().await.unwrap();

    assert!(again.iter().all(|r| r.skipped && r.migrated == 0));
    assert_eq!(store.count_rows(Table::Stores).await.unwrap(), 2);
}

#[tokio::test]
async fn reset_reruns_without_duplicates() {
    let (migrator, store) = migrator(Arc::new(cached()));

    migrator.migrate_stores().await.unwrap();
    migrator.reset().unwrap();
    assert_eq!(migrator.status().unwrap(), MigrationStatus::default());

    let report = migrator.migrate_stores().await.unwrap();
    assert!(!report.skipped);
    assert_eq!(store.count_rows(Table::Stores).await.unwrap(), 2);
}

#[tokio::test]
async fn backend_failure_leaves_the_flag_unset() {
    let (migrator, store) = migrator(Arc::new(cached()));
    store.fail_table(Table::Stores);

    let err = migrator.migrate_stores().await.unwrap_err();
    assert!(matches!(err, MigrationError::Store(_)));
    assert!(!migrator.status().unwrap().stores);

    store.restore_table(Table::Stores);
    let report = migrator.migrate_stores().await.unwrap();
    assert_eq!(report.migrated, 2);
    assert!(migrator.status().unwrap().stores);
}

#[tokio::test]
async fn file_cache_persists_flags_across_instances() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("local-cache.json");
    std::fs::write(
        &path,
        serde_json::to_vec(&json!({
            "mystery_cafe_inventory": [
                {"id": "dice", "name": "Dice set", "quantity": 12, "unit_price": 500, "reorder_level": 4}
            ]
        }))
        .unwrap(),
    )
    .unwrap();

    let (first, store) = migrator(Arc::new(FileCache::new(&path)));
    let report = first.migrate_inventory().await.unwrap();
    assert_eq!(report.migrated, 1);
    assert_eq!(store.count_rows(Table::InventoryItems).await.unwrap(), 1);

    let (second, _) = migrator(Arc::new(FileCache::new(&path)));
    assert!(second.status().unwrap().inventory);
    assert!(second.migrate_inventory().await.unwrap().skipped);
}

#[test]
fn file_cache_reads_missing_file_as_empty() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path().join("absent.json"));

    assert!(cache.get("anything").unwrap().is_none());
    cache.set("key", json!(1)).unwrap();
    assert_eq!(cache.get("key").unwrap(), Some(json!(1)));
}

#[test]
fn file_cache_rejects_non_object_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "[1, 2, 3]").unwrap();

    assert!(FileCache::new(path).get("key").is_err());
}

//! Customization cache and known-devices persistence

use irrigation_bridge::filesys::file::File;
use irrigation_bridge::models::DeviceId;
use irrigation_bridge::storage::cache::CustomizationCache;
use irrigation_bridge::storage::known::{load_known_devices, save_known_devices, KnownDevice, KnownDocument};
use irrigation_bridge::storage::layout::StorageLayout;

#[tokio::test]
async fn test_rename_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(dir.path());
    let file = layout.cache_file();

    let mut cache = CustomizationCache::new();
    cache.ensure_valve("Back Yard", 1);
    cache.ensure_valve("Back Yard", 2);
    cache.rename("Back Yard", 2, "Roses");
    cache.save(&file).await.unwrap();

    let reloaded = CustomizationCache::load(&file).await;
    assert_eq!(reloaded.configured_name("Back Yard", 1), Some("Zone 1"));
    assert_eq!(reloaded.configured_name("Back Yard", 2), Some("Roses"));
    assert_eq!(reloaded, cache);
}

#[tokio::test]
async fn test_cache_file_layout() {
    let dir = tempfile::tempdir().unwrap();
    let file = File::new(dir.path().join("cache.json"));

    let mut cache = CustomizationCache::new();
    cache.rename("Garden", 3, "Hedge");
    cache.save(&file).await.unwrap();

    let raw: serde_json::Value = file.read_json().await.unwrap();
    assert_eq!(raw["Garden"]["3"]["configuredName"], "Hedge");
}

#[tokio::test]
async fn test_corrupt_or_missing_cache_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let missing = File::new(dir.path().join("missing.json"));
    assert!(CustomizationCache::load(&missing).await.document().is_empty());

    let path = dir.path().join("corrupt.json");
    tokio::fs::write(&path, "{not json").await.unwrap();
    let corrupt = File::new(path);
    assert!(CustomizationCache::load(&corrupt).await.document().is_empty());
}

#[tokio::test]
async fn test_known_devices_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let file = StorageLayout::new(dir.path()).known_devices_file();
    assert!(load_known_devices(&file).await.is_empty());

    let id = DeviceId::from_hardware_token("24:0a:c4:00:00:01");
    let mut doc = KnownDocument::new();
    doc.insert(
        id,
        KnownDevice {
            name: "Back Yard".to_string(),
            serial: "240ac4000001".to_string(),
        },
    );
    save_known_devices(&file, &doc).await.unwrap();

    assert_eq!(load_known_devices(&file).await, doc);
}

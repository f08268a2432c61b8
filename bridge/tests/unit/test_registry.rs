//! Device registry behavior through the engine

mod harness;

use std::collections::BTreeMap;
use std::time::Duration;

use harness::Harness;
use irrigation_bridge::models::DeviceId;
use irrigation_bridge::session::ConnectionStatus;
use irrigation_bridge::storage::cache::{CacheDocument, ValveCustomization};
use irrigation_bridge::storage::known::{KnownDevice, KnownDocument};
use irrigation_bridge::surface::memory::Lifecycle;

const FRONT: &str = "24:0a:c4:00:00:01";
const BACK: &str = "24:0a:c4:00:00:02";

fn known(macs: &[&str]) -> KnownDocument {
    macs.iter()
        .map(|mac| {
            (
                DeviceId::from_hardware_token(mac),
                KnownDevice {
                    name: "Garden".to_string(),
                    serial: mac.replace(':', ""),
                },
            )
        })
        .collect()
}

#[tokio::test]
async fn test_new_device_is_started_and_registered() {
    let mut harness = Harness::start(4, &[("Front Lawn", "1,2")], CacheDocument::new(), KnownDocument::new());
    let id = harness.sight("back-yard", BACK, "10.0.0.5").await;

    let device = harness.engine.device(id).await.unwrap();
    assert_eq!(device.name, "Back Yard");
    assert_eq!(device.serial, "240ac4000002");
    assert_eq!(device.valves.len(), 4);
    assert_eq!(device.valves[0].configured_name, "Zone 1");
    assert_eq!(device.programs.len(), 1);

    assert_eq!(harness.surface.lifecycle(), vec![Lifecycle::Registered(id)]);
    let (cache, known) = harness.drain_persisted();
    assert_eq!(cache.unwrap()["Back Yard"].len(), 4);
    assert!(known.unwrap().contains_key(&id));
}

#[tokio::test]
async fn test_known_device_is_not_announced_again() {
    let harness = Harness::start(2, &[], CacheDocument::new(), known(&[BACK]));
    let id = harness.sight("back-yard", BACK, "10.0.0.5").await;

    assert!(harness.engine.device(id).await.is_ok());
    assert!(harness.surface.lifecycle().is_empty());
    assert!(harness.surface.device(id).unwrap().registered);
}

#[tokio::test]
async fn test_resighting_only_reconnects_on_address_change() {
    let harness = Harness::start(2, &[], CacheDocument::new(), KnownDocument::new());
    let id = harness.sight("back-yard", BACK, "10.0.0.5").await;
    harness.push_status(id, ConnectionStatus::Connected).await;

    harness.sight("back-yard", BACK, "10.0.0.5").await;
    assert_eq!(harness.links.lock().unwrap().opened.len(), 1);
    assert!(harness.engine.device(id).await.unwrap().connected);

    harness.sight("back-yard", BACK, "10.0.0.9").await;
    let opened = harness.links.lock().unwrap().opened.clone();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[1].address, "10.0.0.9:81".parse().unwrap());

    let device = harness.engine.device(id).await.unwrap();
    assert_eq!(device.address, "10.0.0.9:81".parse().unwrap());
    assert!(!device.connected);
    assert_eq!(harness.surface.lifecycle().len(), 1);
}

#[tokio::test]
async fn test_events_from_replaced_link_are_ignored() {
    let harness = Harness::start(2, &[], CacheDocument::new(), KnownDocument::new());
    let id = harness.sight("back-yard", BACK, "10.0.0.5").await;
    let old_link = harness.current_link(id);

    harness.sight("back-yard", BACK, "10.0.0.9").await;
    assert_ne!(harness.current_link(id), old_link);

    harness
        .push_link_status(id, old_link, ConnectionStatus::Connected)
        .await;
    assert!(!harness.engine.device(id).await.unwrap().connected);
    assert!(!harness.surface.device(id).unwrap().reachable);

    harness.push_status(id, ConnectionStatus::Connected).await;
    assert!(harness.engine.device(id).await.unwrap().connected);
    assert!(harness.surface.device(id).unwrap().reachable);
}

#[tokio::test]
async fn test_disconnect_keeps_last_known_state() {
    let harness = Harness::start(2, &[], CacheDocument::new(), KnownDocument::new());
    let id = harness.sight("back-yard", BACK, "10.0.0.5").await;
    harness.push_status(id, ConnectionStatus::Connected).await;
    harness
        .push_frame(
            id,
            r#"{"type":"system-status","master":1,"relays":[
                {"relay":1,"status":1,"remainingDuration":120,"defaultDuration":600},
                {"relay":2,"status":0,"remainingDuration":0,"defaultDuration":45}
            ]}"#,
        )
        .await;
    let before = harness.engine.device(id).await.unwrap();

    harness
        .push_status(
            id,
            ConnectionStatus::Disconnected {
                reason: "closed by controller".to_string(),
            },
        )
        .await;

    let after = harness.engine.device(id).await.unwrap();
    assert!(!after.connected);
    assert!(!harness.surface.device(id).unwrap().reachable);
    assert_eq!(after.master, before.master);
    assert!(after.master.active);
    assert!(after.valves[0].active);
    assert_eq!(after.valves[0].set_duration, 600);
    assert_eq!(after.valves[1].set_duration, 45);
    assert!(after.valves[0].remaining_duration > 0);
}

#[tokio::test(start_paused = true)]
async fn test_unseen_known_devices_are_evicted_once() {
    let mut harness = Harness::start(2, &[], CacheDocument::new(), known(&[FRONT, BACK]));
    let front = harness.sight("front-yard", FRONT, "10.0.0.4").await;
    let back = DeviceId::from_hardware_token(BACK);
    harness.drain_persisted();

    tokio::time::sleep(Duration::from_secs(72 * 3600 - 60)).await;
    assert!(harness.surface.lifecycle().is_empty());

    tokio::time::sleep(Duration::from_secs(120)).await;
    let _ = harness.engine.devices().await.unwrap();
    assert_eq!(harness.surface.lifecycle(), vec![Lifecycle::Unregistered(back)]);

    let (_, known) = harness.drain_persisted();
    let known = known.unwrap();
    assert!(known.contains_key(&front));
    assert!(!known.contains_key(&back));

    tokio::time::sleep(Duration::from_secs(72 * 3600)).await;
    assert_eq!(harness.surface.lifecycle().len(), 1);

    // an evicted device that reappears is announced as new
    harness.sight("back-yard", BACK, "10.0.0.5").await;
    assert_eq!(
        harness.surface.lifecycle(),
        vec![Lifecycle::Unregistered(back), Lifecycle::Registered(back)]
    );
}

#[tokio::test]
async fn test_valves_beyond_active_count_are_pruned() {
    let mut valves = BTreeMap::new();
    for relay in 1..=6u8 {
        let configured_name = if relay == 2 {
            "Roses".to_string()
        } else {
            format!("Zone {}", relay)
        };
        valves.insert(relay.to_string(), ValveCustomization { configured_name });
    }
    let mut cache = CacheDocument::new();
    cache.insert("Back Yard".to_string(), valves);

    let mut harness = Harness::start(3, &[], cache, KnownDocument::new());
    let id = harness.sight("back-yard", BACK, "10.0.0.5").await;

    let device = harness.engine.device(id).await.unwrap();
    let names: Vec<String> = device
        .valves
        .iter()
        .map(|valve| valve.configured_name.clone())
        .collect();
    assert_eq!(names, vec!["Zone 1", "Roses", "Zone 3"]);

    let (cache, _) = harness.drain_persisted();
    let cached = &cache.unwrap()["Back Yard"];
    assert_eq!(cached.keys().cloned().collect::<Vec<_>>(), vec!["1", "2", "3"]);

    let surface = harness.surface.device(id).unwrap();
    assert_eq!(surface.valves.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_added_valves_get_default_names() {
    let mut valves = BTreeMap::new();
    valves.insert(
        "1".to_string(),
        ValveCustomization {
            configured_name: "Roses".to_string(),
        },
    );
    let mut cache = CacheDocument::new();
    cache.insert("Back Yard".to_string(), valves);

    let harness = Harness::start(3, &[], cache, KnownDocument::new());
    let id = harness.sight("back-yard", BACK, "10.0.0.5").await;

    let names: Vec<String> = harness
        .engine
        .device(id)
        .await
        .unwrap()
        .valves
        .into_iter()
        .map(|valve| valve.configured_name)
        .collect();
    assert_eq!(names, vec!["Roses", "Zone 2", "Zone 3"]);
}

#[tokio::test]
async fn test_status_frames_update_valves_and_master() {
    let harness = Harness::start(2, &[], CacheDocument::new(), KnownDocument::new());
    let id = harness.sight("back-yard", BACK, "10.0.0.5").await;

    harness
        .push_frame(
            id,
            r#"{"type":"system-status","master":1,"relays":[
                {"relay":1,"status":1,"remainingDuration":120,"defaultDuration":600},
                {"relay":2,"status":0,"remainingDuration":0,"defaultDuration":300}
            ]}"#,
        )
        .await;

    let device = harness.engine.device(id).await.unwrap();
    assert!(device.master.active && device.master.in_use);
    assert!(device.valves[0].active && device.valves[0].in_use);
    assert_eq!(device.valves[0].set_duration, 600);
    assert!(device.valves[0].remaining_duration > 110);
    assert!(!device.valves[1].active);

    harness
        .push_frame(id, r#"{"type":"master-status","status":2}"#)
        .await;
    let master = harness.engine.device(id).await.unwrap().master;
    assert!(master.active);
    assert!(!master.in_use);

    let surface = harness.surface.device(id).unwrap();
    assert_eq!(surface.master, master);
    assert!(surface.valves[&1].active);
}

#[tokio::test]
async fn test_rename_is_persisted() {
    let mut harness = Harness::start(2, &[], CacheDocument::new(), KnownDocument::new());
    let id = harness.sight("back-yard", BACK, "10.0.0.5").await;
    harness.drain_persisted();

    harness
        .engine
        .rename_valve(id, 1, "Vegetables".to_string())
        .await
        .unwrap();

    let (cache, _) = harness.drain_persisted();
    assert_eq!(cache.unwrap()["Back Yard"]["1"].configured_name, "Vegetables");
    assert!(harness.engine.rename_valve(id, 9, "Nope".to_string()).await.is_err());
}

//! Program scheduling through the engine, on a paused clock

mod harness;

use std::time::Duration;

use tokio::time::Instant;

use harness::Harness;
use irrigation_bridge::models::ProgramMode;
use irrigation_bridge::storage::cache::CacheDocument;
use irrigation_bridge::storage::known::KnownDocument;

const MAC: &str = "24:0a:c4:00:00:01";
const LAWN: &str = "program-front_lawn";

fn at(offset: Duration, start: Instant, actual: Instant) -> bool {
    let elapsed = actual.duration_since(start);
    elapsed >= offset && elapsed < offset + Duration::from_millis(50)
}

async fn setup(solenoids: &str) -> (Harness, irrigation_bridge::models::DeviceId) {
    let harness = Harness::start(
        3,
        &[("Front Lawn", solenoids)],
        CacheDocument::new(),
        KnownDocument::new(),
    );
    let id = harness.sight("back-yard", MAC, "10.0.0.5").await;
    for (relay, seconds) in [(1, 2), (2, 3), (3, 1)] {
        harness
            .engine
            .set_valve_duration(id, relay, seconds)
            .await
            .unwrap();
    }
    (harness, id)
}

#[tokio::test(start_paused = true)]
async fn test_program_runs_valves_in_sequence() {
    let (harness, id) = setup("1,2,3").await;

    let start = Instant::now();
    assert!(harness.engine.set_program(id, LAWN, true).await.unwrap());
    assert!(harness.engine.program_running(id, LAWN).await.unwrap());
    let device = harness.engine.device(id).await.unwrap();
    assert_eq!(device.master.program_mode, ProgramMode::ManualProgramRunning);

    tokio::time::sleep(Duration::from_millis(8_900)).await;
    assert!(harness.engine.program_running(id, LAWN).await.unwrap());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!harness.engine.program_running(id, LAWN).await.unwrap());

    let activations = harness.activations();
    assert_eq!(activations.len(), 3);
    let expected = [(1, 0), (2, 3), (3, 7)];
    for ((relay, on, sent_at), (want_relay, offset)) in activations.iter().zip(expected) {
        assert_eq!(*relay, want_relay);
        assert!(on);
        assert!(at(Duration::from_secs(offset), start, *sent_at));
    }

    let device = harness.engine.device(id).await.unwrap();
    assert_eq!(device.master.program_mode, ProgramMode::NoProgramScheduled);
    let surface = harness.surface.device(id).unwrap();
    assert!(!surface.programs[LAWN].on);
}

#[tokio::test(start_paused = true)]
async fn test_stop_switches_off_current_valve() {
    let (harness, id) = setup("1,2,3").await;

    assert!(harness.engine.set_program(id, LAWN, true).await.unwrap());
    tokio::time::sleep(Duration::from_secs(4)).await;
    harness.engine.set_program(id, LAWN, false).await.unwrap();

    assert!(!harness.engine.program_running(id, LAWN).await.unwrap());
    let switched: Vec<(u8, bool)> = harness
        .activations()
        .into_iter()
        .map(|(relay, on, _)| (relay, on))
        .collect();
    assert_eq!(switched, vec![(1, true), (2, true), (2, false)]);

    // the cancelled step never fires
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(harness.activations().len(), 3);
    assert!(!harness.surface.device(id).unwrap().programs[LAWN].on);

    // a fresh start begins again from the first valve
    assert!(harness.engine.set_program(id, LAWN, true).await.unwrap());
    assert_eq!(harness.activations().last().map(|(relay, on, _)| (*relay, *on)), Some((1, true)));
}

#[tokio::test(start_paused = true)]
async fn test_second_start_is_ignored() {
    let (harness, id) = setup("1,2").await;

    assert!(harness.engine.set_program(id, LAWN, true).await.unwrap());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!harness.engine.set_program(id, LAWN, true).await.unwrap());

    tokio::time::sleep(Duration::from_secs(10)).await;
    let relays: Vec<u8> = harness
        .activations()
        .into_iter()
        .map(|(relay, _, _)| relay)
        .collect();
    assert_eq!(relays, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_program_without_valves_completes() {
    let (harness, id) = setup("7,8").await;

    let start = Instant::now();
    assert!(harness.engine.set_program(id, LAWN, true).await.unwrap());
    assert!(harness.engine.program_running(id, LAWN).await.unwrap());

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(!harness.engine.program_running(id, LAWN).await.unwrap());
    assert!(harness.activations().is_empty());
    assert!(Instant::now().duration_since(start) < Duration::from_secs(2));
}

//! Integration coverage for the two scenarios that need a running
//! `Observer` rather than a single pure function: debounce coalescing
//! (§8 property 5) and discovery diffing (§8 property 6). Both drive the
//! observer through its public surface with synthetic data — no `tmux`
//! child process is spawned.

use std::sync::Arc;
use std::time::Duration;

use observer_core::discovery::PaneTopology;
use observer_core::shim::{FakeBackend, Shim};
use observer_core::{Event, Observer, ObserverConfig, PaneRegistry};

fn test_observer(debounce: Duration) -> (Arc<Observer>, tokio::sync::broadcast::Receiver<Event>) {
    let config = ObserverConfig {
        debounce,
        ..ObserverConfig::default()
    };
    let registry = Arc::new(PaneRegistry::new(500));
    let (events_tx, rx) = tokio::sync::broadcast::channel(64);
    (Observer::new(config, registry, events_tx), rx)
}

fn topo(pane_id: &str, session: &str) -> PaneTopology {
    PaneTopology {
        pane_id: pane_id.to_string(),
        session_name: session.to_string(),
        window_name: "win".to_string(),
        window_index: 0,
        pane_index: 0,
        title: "title".to_string(),
        active: true,
    }
}

#[tokio::test]
async fn discovery_diff_matches_added_and_removed_keys() {
    let (observer, _events) = test_observer(Duration::from_millis(15));
    let mut events = observer.registry().get_pane_ids();
    assert!(events.is_empty());

    observer
        .apply_discovery(vec![topo("%1", "main"), topo("%2", "main")], false)
        .await;

    events = observer.registry().get_pane_ids();
    events.sort();
    assert_eq!(events, vec!["%1".to_string(), "%2".to_string()]);

    // %1 drops out, %3 appears: keys should become exactly {%2, %3}.
    observer
        .apply_discovery(vec![topo("%2", "main"), topo("%3", "main")], false)
        .await;

    let mut after = observer.registry().get_pane_ids();
    after.sort();
    assert_eq!(after, vec!["%2".to_string(), "%3".to_string()]);
}

#[tokio::test]
async fn discovery_emits_one_discovered_and_one_removed_event_per_pane() {
    let (observer, mut events) = test_observer(Duration::from_millis(15));

    observer
        .apply_discovery(vec![topo("%1", "main"), topo("%2", "main")], false)
        .await;

    let mut discovered = Vec::new();
    for _ in 0..2 {
        match events.recv().await.unwrap() {
            Event::PaneDiscovered { pane } => discovered.push(pane.pane_id),
            other => panic!("expected PaneDiscovered, got {other:?}"),
        }
    }
    discovered.sort();
    assert_eq!(discovered, vec!["%1".to_string(), "%2".to_string()]);

    // %1 drops out, %3 appears: exactly one removed and one discovered event.
    observer
        .apply_discovery(vec![topo("%2", "main"), topo("%3", "main")], false)
        .await;

    let mut removed = Vec::new();
    let mut added = Vec::new();
    for _ in 0..2 {
        match events.recv().await.unwrap() {
            Event::PaneRemoved { pane_id } => removed.push(pane_id),
            Event::PaneDiscovered { pane } => added.push(pane.pane_id),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(removed, vec!["%1".to_string()]);
    assert_eq!(added, vec!["%3".to_string()]);
}

#[tokio::test]
async fn rapid_output_bursts_collapse_to_a_single_pending_debounce() {
    let (observer, mut events) = test_observer(Duration::from_millis(50));
    let fake = FakeBackend::new();
    fake.set_lines("%1", vec!["a line".to_string()]);
    fake.set_cursor("%1", (0, 0, 1));
    observer.set_shim_override(Shim::Fake(fake)).await;

    observer
        .apply_discovery(vec![topo("%1", "main")], false)
        .await;
    // Discovery itself emits a `pane_discovered`; drain it before asserting
    // on the debounced `pane_update` below.
    assert!(matches!(
        events.recv().await.unwrap(),
        Event::PaneDiscovered { .. }
    ));

    for _ in 0..5 {
        observer.on_pane_output("main", "%1", "a line\n").await;
    }

    // Five rapid appends inside the debounce window collapse into exactly
    // one pending timer, not five.
    assert_eq!(observer.pending_debounce_count().await, 1);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(observer.pending_debounce_count().await, 0);

    // And exactly one `pane_update` was emitted, not five.
    match events.recv().await.unwrap() {
        Event::PaneUpdate { pane_id, .. } => assert_eq!(pane_id, "%1"),
        other => panic!("expected PaneUpdate, got {other:?}"),
    }
    assert!(
        tokio::time::timeout(Duration::from_millis(20), events.recv())
            .await
            .is_err(),
        "expected exactly one pane_update, got a second"
    );
}

#[tokio::test]
async fn calls_spaced_past_the_debounce_window_each_fire_independently() {
    let (observer, mut events) = test_observer(Duration::from_millis(20));
    let fake = FakeBackend::new();
    fake.set_lines("%1", vec!["first".to_string()]);
    fake.set_cursor("%1", (0, 0, 1));
    observer.set_shim_override(Shim::Fake(fake)).await;

    observer
        .apply_discovery(vec![topo("%1", "main")], false)
        .await;
    assert!(matches!(
        events.recv().await.unwrap(),
        Event::PaneDiscovered { .. }
    ));

    observer.on_pane_output("main", "%1", "first\n").await;
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(observer.pending_debounce_count().await, 0);
    assert!(matches!(
        events.recv().await.unwrap(),
        Event::PaneUpdate { .. }
    ));

    observer.on_pane_output("main", "%1", "second\n").await;
    assert_eq!(observer.pending_debounce_count().await, 1);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(observer.pending_debounce_count().await, 0);
    assert!(matches!(
        events.recv().await.unwrap(),
        Event::PaneUpdate { .. }
    ));

    // Two calls spaced past the debounce window fire two independent
    // pane_update events, not one.
    assert!(
        tokio::time::timeout(Duration::from_millis(20), events.recv())
            .await
            .is_err(),
        "expected exactly two pane_update events, got a third"
    );
}

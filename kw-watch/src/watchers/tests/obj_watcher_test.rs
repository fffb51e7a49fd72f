use std::collections::BTreeMap;

use anyhow::anyhow;
use futures::stream;
use httpmock::Method::GET;
use kube::api::ApiResource;
use kube::runtime::watcher::Event;
use kw_core::k8s::{
    GVR,
    WatchedResource,
};
use mockall::predicate;
use tokio::sync::mpsc;
use tracing_test::traced_test;

use super::*;
use crate::event::RawChangeEvent;
use crate::filter::LabelFilter;
use crate::watchers::obj_watcher::{
    ApiLookup,
    MockObjectLookup,
    ObjectLookup,
    Receiver,
};

struct Harness {
    watcher: ObjWatcher,
    rx: Receiver,
    ready_rx: mpsc::Receiver<GVR>,
}

impl Harness {
    fn drain(&mut self) -> Vec<RawChangeEvent> {
        let mut events = vec![];
        while let Ok(msg) = self.rx.try_recv() {
            assert_eq!(msg.gvr, CONFIG_MAP_GVR.clone());
            events.push(msg.event);
        }
        events
    }

    async fn apply_all(&mut self, objs: &[DynamicObject]) {
        for obj in objs {
            self.watcher.handle_event(Event::Apply(obj.clone())).await;
        }
        self.drain();
    }

    async fn relist(&mut self, objs: &[DynamicObject]) {
        self.watcher.handle_event(Event::Init).await;
        for obj in objs {
            self.watcher.handle_event(Event::InitApply(obj.clone())).await;
        }
        self.watcher.handle_event(Event::InitDone).await;
    }
}

fn labeled(name: &str, rv: &str) -> DynamicObject {
    build_config_map(name, rv, watchable_labels(Some(TEST_COMPONENT)))
}

fn unlabeled(name: &str, rv: &str) -> DynamicObject {
    build_config_map(name, rv, BTreeMap::new())
}

// Reduce events to something order-independent and easy to compare
fn summarize(events: &[RawChangeEvent]) -> Vec<(String, String)> {
    let mut summary: Vec<_> = events
        .iter()
        .map(|evt| (evt.event_type().to_string(), evt.current().name_any()))
        .collect();
    summary.sort();
    summary
}

fn config_map_resource() -> WatchedResource {
    WatchedResource {
        gvr: CONFIG_MAP_GVR.clone(),
        api_resource: ApiResource::erase::<corev1::ConfigMap>(&()),
        namespaced: true,
    }
}

fn build_harness(lookup: Box<dyn ObjectLookup + Send + Sync>) -> Harness {
    let (tx, rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = mpsc::channel(1);
    let watcher = ObjWatcher::new(
        CONFIG_MAP_GVR.clone(),
        Box::pin(stream::empty()),
        lookup,
        LabelFilter::default(),
        Duration::from_secs(60),
        tx,
        ready_tx,
        CancellationToken::new(),
    );
    Harness { watcher, rx, ready_rx }
}

// Objects that are gone from the apiserver; with no expectations set, any lookup fails the test
fn lookup_returning(current: Vec<(&'static str, Option<DynamicObject>)>) -> MockObjectLookup {
    let mut lookup = MockObjectLookup::new();
    for (name, obj) in current {
        lookup
            .expect_current()
            .with(predicate::function(move |o: &DynamicObject| o.name_any() == name))
            .returning(move |_| Ok(obj.clone()))
            .once();
    }
    lookup
}

#[fixture]
fn harness() -> Harness {
    build_harness(Box::new(MockObjectLookup::new()))
}

#[rstest]
#[tokio::test]
async fn test_initial_list(mut harness: Harness) {
    harness.relist(&[labeled("cm1", "1"), unlabeled("cm2", "1")]).await;

    assert_eq!(harness.drain(), vec![RawChangeEvent::Create(labeled("cm1", "1"))]);
    assert_eq!(harness.watcher.cached(), vec!["default/cm1"]);
    assert_eq!(harness.ready_rx.try_recv().unwrap(), CONFIG_MAP_GVR.clone());
}

#[rstest]
#[tokio::test]
async fn test_ready_signaled_once(mut harness: Harness) {
    harness.relist(&[]).await;
    harness.relist(&[]).await;

    assert_eq!(harness.ready_rx.try_recv().unwrap(), CONFIG_MAP_GVR.clone());
    assert!(harness.ready_rx.try_recv().is_err());
}

#[rstest]
#[tokio::test]
async fn test_unlabeled_object_never_emits(mut harness: Harness) {
    let obj = unlabeled("cm1", "1");
    harness.watcher.handle_event(Event::Apply(obj.clone())).await;
    harness.watcher.handle_event(Event::Apply(unlabeled("cm1", "2"))).await;
    harness.watcher.handle_event(Event::Delete(obj)).await;

    assert!(harness.drain().is_empty());
    assert!(harness.watcher.cached().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_labeled_object_lifecycle() {
    let mut harness = build_harness(Box::new(lookup_returning(vec![("cm1", None)])));
    harness.watcher.handle_event(Event::Apply(labeled("cm1", "1"))).await;
    harness.watcher.handle_event(Event::Apply(labeled("cm1", "2"))).await;
    harness.watcher.handle_event(Event::Delete(labeled("cm1", "2"))).await;

    assert_eq!(
        harness.drain(),
        vec![
            RawChangeEvent::Create(labeled("cm1", "1")),
            RawChangeEvent::Update { old: labeled("cm1", "1"), new: labeled("cm1", "2") },
            RawChangeEvent::Delete(labeled("cm1", "2")),
        ]
    );
}

#[rstest]
#[tokio::test]
async fn test_label_removed(mut harness: Harness) {
    harness.apply_all(&[labeled("cm1", "1")]).await;

    harness.watcher.handle_event(Event::Apply(unlabeled("cm1", "2"))).await;
    harness.watcher.handle_event(Event::Apply(unlabeled("cm1", "3"))).await;
    harness.watcher.handle_event(Event::Delete(unlabeled("cm1", "3"))).await;

    assert_eq!(
        harness.drain(),
        vec![RawChangeEvent::Update { old: labeled("cm1", "1"), new: unlabeled("cm1", "2") }]
    );
    assert!(harness.watcher.cached().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_label_removed_seen_as_deletion() {
    // A label-selected watch reports the object falling out of the selector as DELETED, with the
    // last labeled state attached
    let mut harness = build_harness(Box::new(lookup_returning(vec![("cm1", Some(unlabeled("cm1", "2")))])));
    harness.apply_all(&[labeled("cm1", "1")]).await;

    harness.watcher.handle_event(Event::Delete(labeled("cm1", "2"))).await;

    assert_eq!(
        harness.drain(),
        vec![RawChangeEvent::Update { old: labeled("cm1", "1"), new: unlabeled("cm1", "2") }]
    );
    assert!(harness.watcher.cached().is_empty());
}

#[rstest]
#[tokio::test]
async fn test_deleted_after_label_removed_in_same_event(mut harness: Harness) {
    harness.apply_all(&[labeled("cm1", "1")]).await;
    harness.watcher.handle_event(Event::Delete(unlabeled("cm1", "2"))).await;

    assert_eq!(
        harness.drain(),
        vec![RawChangeEvent::Update { old: labeled("cm1", "1"), new: unlabeled("cm1", "2") }]
    );
}

#[rstest]
#[tokio::test]
async fn test_deletion_lookup_failure_reports_delete() {
    let mut lookup = MockObjectLookup::new();
    lookup.expect_current().returning(|_| Err(anyhow!("connection refused"))).once();
    let mut harness = build_harness(Box::new(lookup));
    harness.apply_all(&[labeled("cm1", "1")]).await;

    harness.watcher.handle_event(Event::Delete(labeled("cm1", "2"))).await;

    assert_eq!(harness.drain(), vec![RawChangeEvent::Delete(labeled("cm1", "2"))]);
}

#[rstest]
#[tokio::test]
async fn test_label_added_later(mut harness: Harness) {
    harness.watcher.handle_event(Event::Apply(unlabeled("cm1", "1"))).await;
    harness.watcher.handle_event(Event::Apply(labeled("cm1", "2"))).await;

    assert_eq!(harness.drain(), vec![RawChangeEvent::Create(labeled("cm1", "2"))]);
}

#[rstest]
#[tokio::test]
async fn test_relist_diff() {
    let lookup = lookup_returning(vec![("cm3", None), ("cm5", Some(unlabeled("cm5", "2")))]);
    let mut harness = build_harness(Box::new(lookup));
    harness
        .apply_all(&[labeled("cm1", "1"), labeled("cm2", "1"), labeled("cm3", "1"), labeled("cm5", "1")])
        .await;

    harness.relist(&[labeled("cm1", "1"), labeled("cm2", "2"), labeled("cm4", "1")]).await;

    assert_eq!(
        summarize(&harness.drain()),
        vec![
            ("create".to_string(), "cm4".to_string()),
            ("delete".to_string(), "cm3".to_string()),
            ("update".to_string(), "cm2".to_string()),
            ("update".to_string(), "cm5".to_string()),
        ]
    );
    assert_eq!(harness.watcher.cached(), vec!["default/cm1", "default/cm2", "default/cm4"]);
}

#[rstest]
#[tokio::test]
async fn test_resync_replays_cache(mut harness: Harness) {
    harness.apply_all(&[labeled("cm1", "1"), labeled("cm2", "1")]).await;

    harness.watcher.resync();

    let events = harness.drain();
    assert_eq!(
        summarize(&events),
        vec![("update".to_string(), "cm1".to_string()), ("update".to_string(), "cm2".to_string())]
    );
    for evt in events {
        let RawChangeEvent::Update { old, new } = evt else {
            panic!("expected an update, got {evt:?}");
        };
        assert_eq!(old, new);
    }
}

#[rstest]
#[case::unlabeled(true)]
#[case::deleted(false)]
#[tokio::test]
async fn test_departure_checked_against_apiserver(#[case] still_exists: bool) {
    let (mut fake_apiserver, client) = make_fake_apiserver();
    fake_apiserver.handle(move |when, then| {
        when.method(GET).path("/api/v1/namespaces/default/configmaps/cm1");
        if still_exists {
            then.json_body(config_map_json("cm1", "2", &BTreeMap::new()));
        } else {
            then.status(404).json_body(status_not_found());
        }
    });
    fake_apiserver.build();

    let mut harness = build_harness(Box::new(ApiLookup::new(client, &config_map_resource())));
    harness.apply_all(&[labeled("cm1", "1")]).await;
    harness.watcher.handle_event(Event::Delete(labeled("cm1", "2"))).await;

    let events = harness.drain();
    assert_eq!(events.len(), 1);
    match &events[0] {
        RawChangeEvent::Update { old, new } if still_exists => {
            assert_eq!(old, &labeled("cm1", "1"));
            assert_eq!(new.resource_version().as_deref(), Some("2"));
            assert!(new.labels().is_empty());
        },
        RawChangeEvent::Delete(obj) if !still_exists => assert_eq!(obj, &labeled("cm1", "2")),
        evt => panic!("unexpected event {evt:?}"),
    }
    fake_apiserver.assert();
}

#[rstest]
#[tokio::test]
async fn test_start_stops_on_cancel() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let (ready_tx, _ready_rx) = mpsc::channel(1);
    let shutdown = CancellationToken::new();
    let watcher = ObjWatcher::new(
        CONFIG_MAP_GVR.clone(),
        Box::pin(stream::pending()),
        Box::new(MockObjectLookup::new()),
        LabelFilter::default(),
        Duration::from_secs(60),
        tx,
        ready_tx,
        shutdown.clone(),
    );

    let handle = tokio::spawn(watcher.start());
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[rstest]
#[traced_test]
#[tokio::test]
async fn test_start_forwards_stream_events() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (ready_tx, mut ready_rx) = mpsc::channel(1);
    let events = vec![
        Ok(Event::Init),
        Ok(Event::InitApply(labeled("cm1", "1"))),
        Ok(Event::InitDone),
        Err(anyhow!("transient failure")),
        Ok(Event::Apply(labeled("cm1", "2"))),
    ];
    let watcher = ObjWatcher::new(
        CONFIG_MAP_GVR.clone(),
        Box::pin(stream::iter(events)),
        Box::new(MockObjectLookup::new()),
        LabelFilter::default(),
        Duration::from_secs(60),
        tx,
        ready_tx,
        CancellationToken::new(),
    );

    // The stream ends after the last event, which stops the watcher
    watcher.start().await;

    assert_eq!(ready_rx.recv().await.unwrap(), CONFIG_MAP_GVR.clone());
    assert_eq!(rx.recv().await.unwrap().event, RawChangeEvent::Create(labeled("cm1", "1")));
    assert_eq!(
        rx.recv().await.unwrap().event,
        RawChangeEvent::Update { old: labeled("cm1", "1"), new: labeled("cm1", "2") }
    );
    assert!(logs_contain("received error on stream: transient failure"));
}

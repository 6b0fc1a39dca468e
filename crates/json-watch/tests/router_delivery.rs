use std::cell::RefCell;
use std::rc::Rc;

use json_watch::{
    parse_dotted_path, ChangeNotice, EventCoalescer, ModelHandle, PathRouter, ReadValue,
    Scheduler, Snapshot, TrackedModel,
};
use serde_json::json;

fn record(router: &PathRouter, path: &str) -> Rc<RefCell<Vec<ChangeNotice>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    router.subscribe(path, move |notice: &ChangeNotice| {
        sink.borrow_mut().push(notice.clone());
    });
    seen
}

fn branch(handle: &ModelHandle, step: &str) -> ModelHandle {
    match handle.read(step) {
        ReadValue::Handle(child) => child,
        other => panic!("expected container at {step}, got {other:?}"),
    }
}

#[test]
fn containment_delivers_to_self_and_ancestors_only() {
    let model = TrackedModel::new(json!({"a": {"b": {"c": 1}, "x": 9}}));
    let router = PathRouter::new(&model);
    let at_a = record(&router, "a");
    let at_ab = record(&router, "a.b");
    let at_abc = record(&router, "a.b.c");
    let at_ax = record(&router, "a.x");

    let b = branch(&branch(&model.root(), "a"), "b");
    b.write("c", json!(2)).unwrap();

    for seen in [&at_a, &at_ab, &at_abc] {
        let deliveries = seen.borrow();
        assert_eq!(deliveries.len(), 1);
        let events = deliveries[0].events();
        assert_eq!(events.len(), 1);
        // Verbatim: the original change path, not the subscriber's.
        assert_eq!(events[0].path, parse_dotted_path("a.b.c"));
        assert_eq!(events[0].old, Snapshot::Value(json!(1)));
        assert_eq!(events[0].new, Snapshot::Value(json!(2)));
    }
    assert!(at_ax.borrow().is_empty());
}

#[test]
fn ancestor_change_is_rebased_per_subscriber() {
    let model = TrackedModel::new(json!({"a": {"b": {"c": 1}}}));
    let router = PathRouter::new(&model);
    let at_ab = record(&router, "a.b");
    let at_abc = record(&router, "a.b.c");

    model.root().write("a", json!({"b": {"c": 2}})).unwrap();

    let deliveries = at_abc.borrow();
    assert_eq!(deliveries.len(), 1);
    let events = deliveries[0].events();
    assert_eq!(events[0].path, parse_dotted_path("a.b.c"));
    assert_eq!(events[0].old, Snapshot::Value(json!(1)));
    assert_eq!(events[0].new, Snapshot::Value(json!(2)));

    let deliveries = at_ab.borrow();
    assert_eq!(deliveries.len(), 1);
    let events = deliveries[0].events();
    assert_eq!(events[0].path, parse_dotted_path("a.b"));
    assert_eq!(events[0].old, Snapshot::Value(json!({"c": 1})));
    assert_eq!(events[0].new, Snapshot::Value(json!({"c": 2})));
}

#[test]
fn unchanged_rebased_values_are_suppressed() {
    let model = TrackedModel::new(json!({"a": {"b": 1, "x": 1}}));
    let router = PathRouter::new(&model);
    let at_ab = record(&router, "a.b");

    // Only "x" differs; the rebased old/new at "a.b" are deep-equal.
    model.root().write("a", json!({"b": 1, "x": 2})).unwrap();
    assert!(at_ab.borrow().is_empty());

    model.root().write("a", json!({"b": 2, "x": 2})).unwrap();
    assert_eq!(at_ab.borrow().len(), 1);
}

#[test]
fn rebasing_into_a_vanished_branch_reports_absent() {
    let model = TrackedModel::new(json!({"a": {"b": 1}}));
    let router = PathRouter::new(&model);
    let at_ab = record(&router, "a.b");

    model.root().write("a", json!("scalar")).unwrap();

    let deliveries = at_ab.borrow();
    assert_eq!(deliveries.len(), 1);
    let events = deliveries[0].events();
    assert_eq!(events[0].old, Snapshot::Value(json!(1)));
    assert_eq!(events[0].new, Snapshot::Absent);
}

#[test]
fn batches_are_filtered_per_subscriber_in_order() {
    let model = TrackedModel::new(json!({"a": {}, "z": {}}));
    let scheduler = Scheduler::new();
    let coalescer = EventCoalescer::new(model.events(), scheduler.clone());
    let router = PathRouter::new(&coalescer);
    let at_a = record(&router, "a");

    let a = branch(&model.root(), "a");
    let z = branch(&model.root(), "z");
    a.write("one", json!(1)).unwrap();
    z.write("noise", json!(0)).unwrap();
    a.write("two", json!(2)).unwrap();
    scheduler.run_until_idle();

    let deliveries = at_a.borrow();
    assert_eq!(deliveries.len(), 1);
    let events = deliveries[0].events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].path, parse_dotted_path("a.one"));
    assert_eq!(events[1].path, parse_dotted_path("a.two"));
}

#[test]
fn batch_with_no_matches_is_not_delivered() {
    let model = TrackedModel::new(json!({"z": {}}));
    let scheduler = Scheduler::new();
    let coalescer = EventCoalescer::new(model.events(), scheduler.clone());
    let router = PathRouter::new(&coalescer);
    let at_a = record(&router, "a");

    branch(&model.root(), "z").write("n", json!(1)).unwrap();
    scheduler.run_until_idle();
    assert!(at_a.borrow().is_empty());
}

#[test]
fn root_subscriber_observes_every_change() {
    let model = TrackedModel::new(json!({"a": {}}));
    let router = PathRouter::new(&model);
    let at_root = record(&router, "");

    model.root().write("b", json!(1)).unwrap();
    branch(&model.root(), "a").write("c", json!(2)).unwrap();
    assert_eq!(at_root.borrow().len(), 2);
}

#[test]
fn malformed_paths_are_inert_not_errors() {
    let model = TrackedModel::new(json!({"a": 1}));
    let router = PathRouter::new(&model);
    let weird = record(&router, "..!?");

    model.root().write("a", json!(2)).unwrap();
    assert!(weird.borrow().is_empty());
}

#[test]
fn unsubscribe_stops_delivery_and_drops_the_spec() {
    let model = TrackedModel::new(json!({}));
    let router = PathRouter::new(&model);

    let seen = Rc::new(RefCell::new(0u32));
    let sink = Rc::clone(&seen);
    let id = router.subscribe("a", move |_| *sink.borrow_mut() += 1);

    model.root().write("a", json!(1)).unwrap();
    assert!(router.unsubscribe("a", id));
    assert!(!router.unsubscribe("a", id));
    assert_eq!(router.listener_count("a"), 0);

    model.root().write("a", json!(2)).unwrap();
    assert_eq!(*seen.borrow(), 1);
}

#[test]
fn single_shot_subscription_gets_exactly_one_delivery() {
    let model = TrackedModel::new(json!({}));
    let router = PathRouter::new(&model);

    let seen = Rc::new(RefCell::new(0u32));
    let sink = Rc::clone(&seen);
    router.subscribe_once("a", move |_| *sink.borrow_mut() += 1);

    model.root().write("a", json!(1)).unwrap();
    model.root().write("a", json!(2)).unwrap();
    assert_eq!(*seen.borrow(), 1);
    assert_eq!(router.listener_count("a"), 0);
}

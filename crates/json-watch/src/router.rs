use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::emitter::{Emitter, ListenerId};
use crate::events::{ChangeEvent, ChangeNotice, ChangeSource, Snapshot};
use crate::path::{has_prefix, parse_dotted_path, PathStep};
use crate::value::deep_clone;

type SpecTable = Rc<RefCell<HashMap<String, Vec<PathStep>>>>;

/// Routes change events to listeners keyed by dotted path strings.
///
/// Wraps any [`ChangeSource`], so it sees either delivery shape: a
/// [`ChangeNotice::Single`] straight from a model or a
/// [`ChangeNotice::Batch`] from a coalescer flush. Each event is matched
/// against every registered path: changes at or below a subscriber's path
/// are delivered verbatim, changes strictly above it are rebased down to
/// the subscriber's path, and unrelated changes are dropped. Batch
/// contents are filtered per subscriber with relative order preserved and
/// delivered only when non-empty.
///
/// Path strings are parsed once per literal on first registration and the
/// parse is discarded when the last listener for that literal leaves.
/// Malformed strings are accepted; they never match, so the subscription
/// is permanently inert.
pub struct PathRouter {
    downstream: Emitter<ChangeNotice>,
    specs: SpecTable,
}

impl PathRouter {
    pub fn new(source: &impl ChangeSource) -> Self {
        let downstream: Emitter<ChangeNotice> = Emitter::new();
        let specs: SpecTable = Rc::new(RefCell::new(HashMap::new()));
        let sink = downstream.clone();
        let table = Rc::clone(&specs);
        source.on_change(Box::new(move |notice| route(&table, &sink, notice)));
        Self { downstream, specs }
    }

    pub fn subscribe<F>(&self, path: &str, listener: F) -> ListenerId
    where
        F: FnMut(&ChangeNotice) + 'static,
    {
        self.register_spec(path);
        self.downstream.on(path, listener)
    }

    /// Like [`subscribe`](Self::subscribe), but the listener detaches
    /// itself after its first delivery.
    pub fn subscribe_once<F>(&self, path: &str, listener: F) -> ListenerId
    where
        F: FnMut(&ChangeNotice) + 'static,
    {
        self.register_spec(path);
        self.downstream.once(path, listener)
    }

    pub fn unsubscribe(&self, path: &str, id: ListenerId) -> bool {
        let removed = self.downstream.off(path, id);
        if removed && self.downstream.listener_count(path) == 0 {
            self.specs.borrow_mut().remove(path);
        }
        removed
    }

    pub fn unsubscribe_all(&self, path: &str) {
        self.downstream.remove_all(path);
        self.specs.borrow_mut().remove(path);
    }

    pub fn listener_count(&self, path: &str) -> usize {
        self.downstream.listener_count(path)
    }

    fn register_spec(&self, path: &str) {
        self.specs
            .borrow_mut()
            .entry(path.to_owned())
            .or_insert_with(|| parse_dotted_path(path));
    }
}

fn route(specs: &SpecTable, downstream: &Emitter<ChangeNotice>, notice: &ChangeNotice) {
    let targets: Vec<(String, Vec<PathStep>)> = specs
        .borrow()
        .iter()
        .map(|(literal, steps)| (literal.clone(), steps.clone()))
        .collect();
    for (literal, steps) in targets {
        match notice {
            ChangeNotice::Single(event) => {
                if let Some(routed) = rebase(event, &steps) {
                    downstream.emit(&literal, &ChangeNotice::Single(routed));
                }
            }
            ChangeNotice::Batch(events) => {
                let routed: Vec<ChangeEvent> =
                    events.iter().filter_map(|event| rebase(event, &steps)).collect();
                if !routed.is_empty() {
                    downstream.emit(&literal, &ChangeNotice::Batch(routed));
                }
            }
        }
        // Single-shot listeners detach during delivery; drop the parsed
        // spec once the literal has no listeners left.
        if downstream.listener_count(&literal) == 0 {
            specs.borrow_mut().remove(&literal);
        }
    }
}

/// Filters one event against one subscriber path.
///
/// Self-or-descendant changes pass through verbatim. Strict-ancestor
/// changes are rebased: the subscriber's trailing segments are walked
/// into the old and new snapshots independently, resolving to `Absent`
/// whenever a step cannot be taken. A rebased pair that is structurally
/// equal (including both-absent) is suppressed as a no-op.
fn rebase(event: &ChangeEvent, subscriber: &[PathStep]) -> Option<ChangeEvent> {
    if has_prefix(&event.path, subscriber) {
        return Some(event.clone());
    }
    if !has_prefix(subscriber, &event.path) {
        return None;
    }
    let tail = &subscriber[event.path.len()..];
    let old = descend(&event.old, tail);
    let new = descend(&event.new, tail);
    if old.same_as(&new) {
        return None;
    }
    Some(ChangeEvent {
        path: subscriber.to_vec(),
        old,
        new,
    })
}

fn descend(snapshot: &Snapshot, tail: &[PathStep]) -> Snapshot {
    let mut current = match snapshot {
        Snapshot::Value(value) => value,
        Snapshot::Absent => return Snapshot::Absent,
    };
    for step in tail {
        current = match (current, step) {
            (Value::Object(map), PathStep::Key(key)) => match map.get(key.as_str()) {
                Some(child) => child,
                None => return Snapshot::Absent,
            },
            (Value::Array(items), PathStep::Index(index)) => match items.get(*index) {
                Some(child) => child,
                None => return Snapshot::Absent,
            },
            _ => return Snapshot::Absent,
        };
    }
    Snapshot::Value(deep_clone(current))
}

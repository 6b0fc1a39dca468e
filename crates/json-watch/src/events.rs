use serde_json::Value;

use crate::emitter::ListenerId;
use crate::path::PathStep;
use crate::value::{deep_clone, deep_equal};

/// Event name on which change-tracking models publish.
pub const CHANGE: &str = "change";

/// A captured value, with absence distinguished from a stored `null`.
///
/// `Absent` is used as the old value when a write introduces a
/// previously-missing key, as the new value on removal, and as the result
/// of rebasing whenever a path segment cannot be resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Absent,
    Value(Value),
}

impl Snapshot {
    /// Deep-copies an optional live value into an owned snapshot.
    pub fn capture(value: Option<&Value>) -> Self {
        match value {
            Some(value) => Snapshot::Value(deep_clone(value)),
            None => Snapshot::Absent,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Snapshot::Absent)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Snapshot::Absent => None,
            Snapshot::Value(value) => Some(value),
        }
    }

    /// Structural equality; two `Absent` snapshots are equal.
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Snapshot::Absent, Snapshot::Absent) => true,
            (Snapshot::Value(a), Snapshot::Value(b)) => deep_equal(a, b),
            _ => false,
        }
    }
}

/// One observed mutation: the path it happened at and the value before
/// and after. Both payloads are independent deep copies taken at
/// emission time.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub path: Vec<PathStep>,
    pub old: Snapshot,
    pub new: Snapshot,
}

/// The two delivery shapes consumers must accept: a single event straight
/// from a model, or an ordered batch from a coalescer flush.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeNotice {
    Single(ChangeEvent),
    Batch(Vec<ChangeEvent>),
}

impl ChangeNotice {
    pub fn events(&self) -> &[ChangeEvent] {
        match self {
            ChangeNotice::Single(event) => std::slice::from_ref(event),
            ChangeNotice::Batch(events) => events,
        }
    }

    pub fn into_events(self) -> Vec<ChangeEvent> {
        match self {
            ChangeNotice::Single(event) => vec![event],
            ChangeNotice::Batch(events) => events,
        }
    }
}

/// Anything that publishes [`ChangeNotice`]s on the `"change"` name.
///
/// Both [`TrackedModel`](crate::TrackedModel) and
/// [`EventCoalescer`](crate::EventCoalescer) implement this, so a
/// [`PathRouter`](crate::PathRouter) can wrap either without caring which
/// delivery shape it will see.
pub trait ChangeSource {
    fn on_change(&self, listener: Box<dyn FnMut(&ChangeNotice) + 'static>) -> ListenerId;
    fn off_change(&self, id: ListenerId) -> bool;
}

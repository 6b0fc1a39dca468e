//! Fine-grained, path-addressed change notification over a nested JSON
//! tree, without manual instrumentation of mutation sites.
//!
//! Three parts form the pipeline:
//! - [`TrackedModel`] wraps a root value; every nested read of a container
//!   returns a stable [`ModelHandle`] that itself intercepts reads, writes
//!   and removals, emitting a `change` event `(path, old, new)`
//!   synchronously on every mutation.
//! - [`EventCoalescer`] wraps a change-event source, buffers same-tick
//!   emissions per event name and flushes each buffer as one ordered batch
//!   per scheduler tick. Upstream subscription is lazy per name.
//! - [`PathRouter`] wraps either of the above and delivers events to
//!   listeners keyed by dotted path strings, rebasing ancestor changes
//!   down to each subscriber's path.
//!
//! Everything is single-threaded and cooperative; the [`Scheduler`] is the
//! only suspension point.
//!
//! ```
//! use json_watch::{ChangeNotice, EventCoalescer, PathRouter, Scheduler, TrackedModel};
//! use serde_json::json;
//!
//! let model = TrackedModel::new(json!({"user": {"name": "ann"}}));
//! let scheduler = Scheduler::new();
//! let coalescer = EventCoalescer::new(model.events(), scheduler.clone());
//! let router = PathRouter::new(&coalescer);
//!
//! router.subscribe("user.name", |notice: &ChangeNotice| {
//!     for event in notice.events() {
//!         println!("name: {:?} -> {:?}", event.old, event.new);
//!     }
//! });
//!
//! let user = match model.root().read("user") {
//!     json_watch::ReadValue::Handle(handle) => handle,
//!     _ => unreachable!(),
//! };
//! user.write("name", json!("bob")).unwrap();
//! scheduler.run_until_idle();
//! ```

pub mod coalescer;
pub mod emitter;
pub mod events;
pub mod model;
pub mod path;
pub mod router;
pub mod scheduler;
pub mod value;

pub use coalescer::EventCoalescer;
pub use emitter::{Emitter, ListenerId};
pub use events::{ChangeEvent, ChangeNotice, ChangeSource, Snapshot, CHANGE};
pub use model::{ModelError, ModelHandle, ReadValue, TrackedModel};
pub use path::{format_path, has_prefix, parse_dotted_path, PathStep};
pub use router::PathRouter;
pub use scheduler::Scheduler;
pub use value::{deep_clone, deep_equal, is_container};

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

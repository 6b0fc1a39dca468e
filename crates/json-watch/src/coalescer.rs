use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::emitter::{Emitter, ListenerId};
use crate::events::{ChangeEvent, ChangeNotice, ChangeSource, CHANGE};
use crate::scheduler::Scheduler;

#[derive(Default)]
struct CoalescerState {
    buffers: IndexMap<String, Vec<ChangeNotice>>,
    flush_scheduled: bool,
    upstream_ids: HashMap<String, ListenerId>,
}

/// Turns a bursty synchronous event stream into batched, order-preserving
/// deliveries.
///
/// Upstream subscription is listener-count-gated per event name: the
/// coalescer attaches upstream on the zero-to-one downstream transition
/// and detaches on one-to-zero, so emissions for an unobserved name are
/// never captured at all. Same-tick emissions for a name accumulate in an
/// ordered buffer; the first buffered item defers exactly one flush on
/// the scheduler, and the flush delivers each non-empty buffer as one
/// [`ChangeNotice::Batch`] in arrival order.
///
/// A `once` registration is satisfied by exactly one flush delivery,
/// which may bundle multiple upstream emissions.
pub struct EventCoalescer {
    upstream: Emitter<ChangeNotice>,
    downstream: Emitter<ChangeNotice>,
    scheduler: Scheduler,
    state: Rc<RefCell<CoalescerState>>,
}

impl EventCoalescer {
    pub fn new(upstream: Emitter<ChangeNotice>, scheduler: Scheduler) -> Self {
        Self {
            upstream,
            downstream: Emitter::new(),
            scheduler,
            state: Rc::new(RefCell::new(CoalescerState::default())),
        }
    }

    pub fn on<F>(&self, name: &str, listener: F) -> ListenerId
    where
        F: FnMut(&ChangeNotice) + 'static,
    {
        self.attach(name);
        self.downstream.on(name, listener)
    }

    pub fn once<F>(&self, name: &str, listener: F) -> ListenerId
    where
        F: FnMut(&ChangeNotice) + 'static,
    {
        self.attach(name);
        self.downstream.once(name, listener)
    }

    /// Detaches one downstream listener. On the one-to-zero transition the
    /// upstream subscription for `name` is dropped along with any pending
    /// buffer; an already-scheduled flush finds no buffer for the name.
    pub fn off(&self, name: &str, id: ListenerId) -> bool {
        if !self.downstream.off(name, id) {
            return false;
        }
        if self.downstream.listener_count(name) == 0 {
            self.detach(name);
        }
        true
    }

    pub fn remove_all(&self, name: &str) {
        self.downstream.remove_all(name);
        self.detach(name);
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.downstream.listener_count(name)
    }

    /// Event names with at least one downstream listener.
    pub fn names(&self) -> Vec<String> {
        self.downstream.names()
    }

    /// Subscribes upstream for `name` unless already subscribed. The
    /// upstream-id entry is the attachment flag: `Emitter` listeners can
    /// self-detach (single-shot registrations do, mid-flush), so the
    /// live downstream count is the only trustworthy gate and no
    /// separate registration count is kept.
    fn attach(&self, name: &str) {
        if self.state.borrow().upstream_ids.contains_key(name) {
            return;
        }
        let channel = name.to_owned();
        let buffers = Rc::clone(&self.state);
        let scheduler = self.scheduler.clone();
        let downstream = self.downstream.clone();
        let upstream = self.upstream.clone();
        let id = self.upstream.on(name, move |payload| {
            let schedule = {
                let mut state = buffers.borrow_mut();
                state
                    .buffers
                    .entry(channel.clone())
                    .or_default()
                    .push(payload.clone());
                if state.flush_scheduled {
                    false
                } else {
                    state.flush_scheduled = true;
                    true
                }
            };
            if schedule {
                let state = Rc::clone(&buffers);
                let downstream = downstream.clone();
                let upstream = upstream.clone();
                scheduler.defer(move || flush(&state, &downstream, &upstream));
            }
        });
        self.state.borrow_mut().upstream_ids.insert(name.to_owned(), id);
    }

    fn detach(&self, name: &str) {
        let upstream_id = {
            let mut state = self.state.borrow_mut();
            state.buffers.shift_remove(name);
            state.upstream_ids.remove(name)
        };
        if let Some(id) = upstream_id {
            self.upstream.off(name, id);
        }
    }
}

impl ChangeSource for EventCoalescer {
    fn on_change(&self, listener: Box<dyn FnMut(&ChangeNotice) + 'static>) -> ListenerId {
        self.on(CHANGE, listener)
    }

    fn off_change(&self, id: ListenerId) -> bool {
        self.off(CHANGE, id)
    }
}

/// Delivers every non-empty buffer as one batch and resets the
/// scheduled-flush flag.
fn flush(
    state: &Rc<RefCell<CoalescerState>>,
    downstream: &Emitter<ChangeNotice>,
    upstream: &Emitter<ChangeNotice>,
) {
    let drained: Vec<(String, Vec<ChangeNotice>)> = {
        let mut state = state.borrow_mut();
        state.flush_scheduled = false;
        state.buffers.drain(..).collect()
    };
    for (name, buffered) in drained {
        if buffered.is_empty() {
            continue;
        }
        let mut events: Vec<ChangeEvent> = Vec::with_capacity(buffered.len());
        for notice in buffered {
            events.extend(notice.into_events());
        }
        downstream.emit(&name, &ChangeNotice::Batch(events));
        // Single-shot listeners detach themselves during delivery; drop
        // the upstream subscription once nobody is left for the name.
        if downstream.listener_count(&name) == 0 {
            let upstream_id = {
                let mut state = state.borrow_mut();
                state.buffers.shift_remove(&name);
                state.upstream_ids.remove(&name)
            };
            if let Some(id) = upstream_id {
                upstream.off(&name, id);
            }
        }
    }
}

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Cooperative deferred-callback queue.
///
/// Stands in for the host scheduler's "run after the current synchronous
/// work completes" hook: producers enqueue with [`defer`](Self::defer) and
/// the embedding drives the queue with
/// [`run_until_idle`](Self::run_until_idle). One dequeue is one tick.
/// Cloning shares the queue. Single-threaded, no timers.
pub struct Scheduler {
    queue: Rc<RefCell<VecDeque<Box<dyn FnOnce()>>>>,
}

impl Clone for Scheduler {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            queue: Rc::new(RefCell::new(VecDeque::new())),
        }
    }

    /// Enqueues a callback to run on a later tick.
    pub fn defer<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.queue.borrow_mut().push_back(Box::new(callback));
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    /// Runs deferred callbacks until the queue is empty.
    ///
    /// Callbacks may defer further work; it runs in a later iteration of
    /// the same drain. The queue is never borrowed while a callback runs,
    /// so callbacks may freely re-enter the scheduler.
    pub fn run_until_idle(&self) {
        loop {
            let job = self.queue.borrow_mut().pop_front();
            match job {
                Some(job) => job(),
                None => break,
            }
        }
    }
}

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

/// Identifier returned by [`Emitter::on`] and friends, used to detach a
/// specific listener again. Unique per emitter.
pub type ListenerId = u64;

type Callback<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct Entry<T> {
    id: ListenerId,
    callback: Callback<T>,
    once: bool,
}

struct Channels<T> {
    channels: IndexMap<String, Vec<Entry<T>>>,
    next_id: ListenerId,
}

/// Single-threaded, name-keyed publish/subscribe primitive.
///
/// Listeners for a name are invoked synchronously and in registration
/// order. Cloning an `Emitter` shares the underlying channel table, so a
/// producer and any number of wrappers can publish and subscribe through
/// the same instance. `once` listeners are detached before their single
/// invocation, so re-entrant emission cannot deliver to them twice.
pub struct Emitter<T> {
    inner: Rc<RefCell<Channels<T>>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Emitter<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Channels {
                channels: IndexMap::new(),
                next_id: 1,
            })),
        }
    }

    /// Registers a listener for `name`.
    pub fn on<F>(&self, name: &str, listener: F) -> ListenerId
    where
        F: FnMut(&T) + 'static,
    {
        self.register(name, listener, false)
    }

    /// Registers a listener that detaches itself after one delivery.
    pub fn once<F>(&self, name: &str, listener: F) -> ListenerId
    where
        F: FnMut(&T) + 'static,
    {
        self.register(name, listener, true)
    }

    fn register<F>(&self, name: &str, listener: F, once: bool) -> ListenerId
    where
        F: FnMut(&T) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        let callback: Callback<T> = Rc::new(RefCell::new(listener));
        inner
            .channels
            .entry(name.to_owned())
            .or_default()
            .push(Entry { id, callback, once });
        id
    }

    /// Removes one listener; returns `false` when the id was not
    /// registered under `name`.
    pub fn off(&self, name: &str, id: ListenerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let (removed, now_empty) = match inner.channels.get_mut(name) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|entry| entry.id != id);
                (entries.len() != before, entries.is_empty())
            }
            None => return false,
        };
        if now_empty {
            inner.channels.shift_remove(name);
        }
        removed
    }

    /// Removes every listener registered for `name`.
    pub fn remove_all(&self, name: &str) {
        self.inner.borrow_mut().channels.shift_remove(name);
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.inner
            .borrow()
            .channels
            .get(name)
            .map_or(0, |entries| entries.len())
    }

    /// Names that currently have at least one listener.
    pub fn names(&self) -> Vec<String> {
        self.inner.borrow().channels.keys().cloned().collect()
    }

    /// Synchronously invokes every listener registered for `name`.
    ///
    /// The listener list is snapshotted up front: a listener detached
    /// during dispatch still receives this emission, one registered during
    /// dispatch does not.
    pub fn emit(&self, name: &str, payload: &T) {
        let callbacks: Vec<Callback<T>> = {
            let mut inner = self.inner.borrow_mut();
            let (callbacks, now_empty) = match inner.channels.get_mut(name) {
                Some(entries) => {
                    let callbacks: Vec<Callback<T>> =
                        entries.iter().map(|entry| Rc::clone(&entry.callback)).collect();
                    entries.retain(|entry| !entry.once);
                    (callbacks, entries.is_empty())
                }
                None => return,
            };
            if now_empty {
                inner.channels.shift_remove(name);
            }
            callbacks
        };
        for callback in callbacks {
            (&mut *callback.borrow_mut())(payload);
        }
    }
}

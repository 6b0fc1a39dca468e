use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::emitter::{Emitter, ListenerId};
use crate::events::{ChangeEvent, ChangeNotice, ChangeSource, Snapshot, CHANGE};
use crate::path::PathStep;
use crate::value::{deep_clone, is_container};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("value at handle path is not a container")]
    NotContainer,
    #[error("string key used on an array")]
    KeyOnArray,
    #[error("numeric index used on an object")]
    IndexOnObject,
    #[error("index {index} out of bounds for array of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Result of reading one step through a [`ModelHandle`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReadValue {
    /// The key/index is absent (or the handle is detached).
    Absent,
    /// A primitive value, returned by copy.
    Scalar(Value),
    /// A container, returned as a memoized child handle.
    Handle(ModelHandle),
}

/// Shadow node mirroring one traversed container location.
///
/// Nodes exist only for paths that have actually been read. Once the
/// location a node mirrors is overwritten or removed, the node and its
/// whole subtree are marked invalid, pruned from the parent's child map
/// and put on the free list; an invalid node never emits again. Slots
/// are generation-stamped so a reused slot never revives the detached
/// handles that still point at it.
#[derive(Debug)]
struct ShadowNode {
    path: Vec<PathStep>,
    children: HashMap<PathStep, usize>,
    valid: bool,
    generation: u64,
}

#[derive(Debug)]
struct ModelState {
    root: Value,
    nodes: Vec<ShadowNode>,
    free: Vec<usize>,
}

impl ModelState {
    fn live(&self, node: usize, generation: u64) -> bool {
        let shadow = &self.nodes[node];
        shadow.valid && shadow.generation == generation
    }

    /// Allocates a shadow node for `path`, reusing a pruned slot when one
    /// is available. Reuse bumps the slot's generation.
    fn alloc(&mut self, path: Vec<PathStep>) -> usize {
        match self.free.pop() {
            Some(slot) => {
                let shadow = &mut self.nodes[slot];
                shadow.path = path;
                shadow.valid = true;
                shadow.generation += 1;
                slot
            }
            None => {
                self.nodes.push(ShadowNode {
                    path,
                    children: HashMap::new(),
                    valid: true,
                    generation: 0,
                });
                self.nodes.len() - 1
            }
        }
    }
}

/// Wraps a root JSON value and emits a `change` event synchronously on
/// every write/delete performed through its handles.
///
/// ```
/// use json_watch::{ChangeNotice, TrackedModel};
/// use serde_json::json;
///
/// let model = TrackedModel::new(json!({"a": {"b": 1}}));
/// model.events().on("change", |notice: &ChangeNotice| {
///     let event = &notice.events()[0];
///     println!("changed at {:?}", event.path);
/// });
/// model.root().write("a", json!({"b": 2})).unwrap();
/// ```
pub struct TrackedModel {
    state: Rc<RefCell<ModelState>>,
    events: Emitter<ChangeNotice>,
}

/// Stable handle over one container location inside a [`TrackedModel`].
///
/// Repeated reads of the same live location return `==`-equal handles
/// (they share one shadow node). A handle whose location has been
/// replaced or removed is detached: reads resolve to
/// [`ReadValue::Absent`] and writes are silently absorbed.
pub struct ModelHandle {
    state: Rc<RefCell<ModelState>>,
    events: Emitter<ChangeNotice>,
    node: usize,
    generation: u64,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("path", &self.path())
            .field("detached", &self.is_detached())
            .finish()
    }
}

impl TrackedModel {
    pub fn new(root: Value) -> Self {
        let state = ModelState {
            root,
            nodes: vec![ShadowNode {
                path: Vec::new(),
                children: HashMap::new(),
                valid: true,
                generation: 0,
            }],
            free: Vec::new(),
        };
        Self {
            state: Rc::new(RefCell::new(state)),
            events: Emitter::new(),
        }
    }

    /// Handle over the root location.
    pub fn root(&self) -> ModelHandle {
        ModelHandle {
            state: Rc::clone(&self.state),
            events: self.events.clone(),
            node: 0,
            generation: 0,
        }
    }

    /// The event source this model publishes on (name [`CHANGE`]).
    pub fn events(&self) -> Emitter<ChangeNotice> {
        self.events.clone()
    }

    /// Deep copy of the current tree.
    pub fn view(&self) -> Value {
        deep_clone(&self.state.borrow().root)
    }
}

impl Default for TrackedModel {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl ChangeSource for TrackedModel {
    fn on_change(&self, listener: Box<dyn FnMut(&ChangeNotice) + 'static>) -> ListenerId {
        self.events.on(CHANGE, listener)
    }

    fn off_change(&self, id: ListenerId) -> bool {
        self.events.off(CHANGE, id)
    }
}

impl Clone for ModelHandle {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
            events: self.events.clone(),
            node: self.node,
            generation: self.generation,
        }
    }
}

impl PartialEq for ModelHandle {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
            && self.generation == other.generation
            && Rc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for ModelHandle {}

impl ModelHandle {
    /// Reads one step below this handle.
    ///
    /// Primitives come back by copy; containers come back as the memoized
    /// child handle for that location, so recursive interception applies
    /// transparently and handle identity survives repeated reads.
    pub fn read(&self, step: impl Into<PathStep>) -> ReadValue {
        let step = step.into();
        let mut state = self.state.borrow_mut();
        if !state.live(self.node, self.generation) {
            return ReadValue::Absent;
        }
        let path = state.nodes[self.node].path.clone();
        {
            let Some(container) = resolve(&state.root, &path) else {
                return ReadValue::Absent;
            };
            match child_of(container, &step) {
                None => return ReadValue::Absent,
                Some(child) if !is_container(child) => return ReadValue::Scalar(child.clone()),
                Some(_) => {}
            }
        }
        if let Some(&child) = state.nodes[self.node].children.get(&step) {
            let generation = state.nodes[child].generation;
            return ReadValue::Handle(self.handle_for(child, generation));
        }
        let mut child_path = path;
        child_path.push(step.clone());
        let child = state.alloc(child_path);
        let generation = state.nodes[child].generation;
        state.nodes[self.node].children.insert(step, child);
        ReadValue::Handle(self.handle_for(child, generation))
    }

    /// Writes one step below this handle and emits a single change event.
    ///
    /// Writing `Index(len)` appends. When the overwritten value was a
    /// container, the shadow subtree that mirrored it is invalidated and
    /// pruned before the event goes out. Writes through a detached handle
    /// are silently absorbed.
    pub fn write(&self, step: impl Into<PathStep>, value: Value) -> Result<(), ModelError> {
        let step = step.into();
        let event = {
            let mut state = self.state.borrow_mut();
            if !state.live(self.node, self.generation) {
                return Ok(());
            }
            let path = state.nodes[self.node].path.clone();
            let new = Snapshot::Value(deep_clone(&value));
            let old = {
                let container =
                    resolve_mut(&mut state.root, &path).ok_or(ModelError::NotContainer)?;
                match (container, &step) {
                    (Value::Object(map), PathStep::Key(key)) => {
                        let old = map.get(key.as_str()).map(deep_clone);
                        map.insert(key.clone(), value);
                        old
                    }
                    (Value::Array(items), PathStep::Index(index)) => {
                        let index = *index;
                        if index < items.len() {
                            let old = deep_clone(&items[index]);
                            items[index] = value;
                            Some(old)
                        } else if index == items.len() {
                            items.push(value);
                            None
                        } else {
                            return Err(ModelError::IndexOutOfBounds {
                                index,
                                len: items.len(),
                            });
                        }
                    }
                    (Value::Array(_), PathStep::Key(_)) => return Err(ModelError::KeyOnArray),
                    (Value::Object(_), PathStep::Index(_)) => {
                        return Err(ModelError::IndexOnObject)
                    }
                    _ => return Err(ModelError::NotContainer),
                }
            };
            if matches!(old, Some(Value::Array(_) | Value::Object(_))) {
                prune_child(&mut state, self.node, &step);
            }
            let mut event_path = path;
            event_path.push(step);
            ChangeEvent {
                path: event_path,
                old: old.map_or(Snapshot::Absent, Snapshot::Value),
                new,
            }
        };
        self.events.emit(CHANGE, &ChangeNotice::Single(event));
        Ok(())
    }

    /// Removes one step below this handle, emitting
    /// `new = Snapshot::Absent`. Returns the removed value's snapshot.
    ///
    /// Removing an absent object key still emits (with `old` also
    /// `Absent`); removes through a detached handle are silently absorbed.
    pub fn remove(&self, step: impl Into<PathStep>) -> Result<Snapshot, ModelError> {
        let step = step.into();
        let (event, removed) = {
            let mut state = self.state.borrow_mut();
            if !state.live(self.node, self.generation) {
                return Ok(Snapshot::Absent);
            }
            let path = state.nodes[self.node].path.clone();
            let old = {
                let container =
                    resolve_mut(&mut state.root, &path).ok_or(ModelError::NotContainer)?;
                match (container, &step) {
                    (Value::Object(map), PathStep::Key(key)) => map.remove(key.as_str()),
                    (Value::Array(items), PathStep::Index(index)) => {
                        let index = *index;
                        if index < items.len() {
                            Some(items.remove(index))
                        } else {
                            return Err(ModelError::IndexOutOfBounds {
                                index,
                                len: items.len(),
                            });
                        }
                    }
                    (Value::Array(_), PathStep::Key(_)) => return Err(ModelError::KeyOnArray),
                    (Value::Object(_), PathStep::Index(_)) => {
                        return Err(ModelError::IndexOnObject)
                    }
                    _ => return Err(ModelError::NotContainer),
                }
            };
            if matches!(&old, Some(value) if is_container(value)) {
                prune_child(&mut state, self.node, &step);
            }
            let removed = old.map_or(Snapshot::Absent, Snapshot::Value);
            let mut event_path = path;
            event_path.push(step);
            let event = ChangeEvent {
                path: event_path,
                old: removed.clone(),
                new: Snapshot::Absent,
            };
            (event, removed)
        };
        self.events.emit(CHANGE, &ChangeNotice::Single(event));
        Ok(removed)
    }

    /// Appends to the array at this handle.
    ///
    /// Emits exactly one event, for the new index; there is no separate
    /// length-bookkeeping event.
    pub fn push(&self, value: Value) -> Result<(), ModelError> {
        if self.is_detached() {
            return Ok(());
        }
        let len = self.len()?;
        self.write(PathStep::Index(len), value)
    }

    /// Removes and returns the last element of the array at this handle.
    /// Popping an empty array is a no-op and emits nothing.
    pub fn pop(&self) -> Result<Option<Value>, ModelError> {
        if self.is_detached() {
            return Ok(None);
        }
        let len = self.len()?;
        if len == 0 {
            return Ok(None);
        }
        match self.remove(PathStep::Index(len - 1))? {
            Snapshot::Value(value) => Ok(Some(value)),
            Snapshot::Absent => Ok(None),
        }
    }

    pub fn len(&self) -> Result<usize, ModelError> {
        let state = self.state.borrow();
        if !state.live(self.node, self.generation) {
            return Err(ModelError::NotContainer);
        }
        match resolve(&state.root, &state.nodes[self.node].path) {
            Some(Value::Array(items)) => Ok(items.len()),
            _ => Err(ModelError::NotContainer),
        }
    }

    pub fn is_empty(&self) -> Result<bool, ModelError> {
        Ok(self.len()? == 0)
    }

    /// Deep copy of the value this handle currently points at, or `None`
    /// when the handle is detached.
    pub fn view(&self) -> Option<Value> {
        let state = self.state.borrow();
        if !state.live(self.node, self.generation) {
            return None;
        }
        resolve(&state.root, &state.nodes[self.node].path).map(deep_clone)
    }

    /// The path this handle mirrors; empty once the handle is detached
    /// (the shadow slot may since mirror an unrelated location).
    pub fn path(&self) -> Vec<PathStep> {
        let state = self.state.borrow();
        if !state.live(self.node, self.generation) {
            return Vec::new();
        }
        state.nodes[self.node].path.clone()
    }

    /// `true` once the location this handle mirrors has been overwritten
    /// or removed.
    pub fn is_detached(&self) -> bool {
        !self.state.borrow().live(self.node, self.generation)
    }

    fn handle_for(&self, node: usize, generation: u64) -> ModelHandle {
        ModelHandle {
            state: Rc::clone(&self.state),
            events: self.events.clone(),
            node,
            generation,
        }
    }
}

/// Invalidates and detaches the shadow subtree below `node` at `step`,
/// returning every pruned slot to the free list for reuse.
fn prune_child(state: &mut ModelState, node: usize, step: &PathStep) {
    let Some(child) = state.nodes[node].children.remove(step) else {
        return;
    };
    let mut stack = vec![child];
    while let Some(id) = stack.pop() {
        state.nodes[id].valid = false;
        state.nodes[id].path = Vec::new();
        let grandchildren: Vec<usize> =
            state.nodes[id].children.drain().map(|(_, id)| id).collect();
        stack.extend(grandchildren);
        state.free.push(id);
    }
}

fn resolve<'a>(root: &'a Value, path: &[PathStep]) -> Option<&'a Value> {
    let mut current = root;
    for step in path {
        current = child_of(current, step)?;
    }
    Some(current)
}

fn resolve_mut<'a>(root: &'a mut Value, path: &[PathStep]) -> Option<&'a mut Value> {
    let mut current = root;
    for step in path {
        current = match (current, step) {
            (Value::Object(map), PathStep::Key(key)) => map.get_mut(key.as_str())?,
            (Value::Array(items), PathStep::Index(index)) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

fn child_of<'a>(container: &'a Value, step: &PathStep) -> Option<&'a Value> {
    match (container, step) {
        (Value::Object(map), PathStep::Key(key)) => map.get(key.as_str()),
        (Value::Array(items), PathStep::Index(index)) => items.get(*index),
        _ => None,
    }
}

//! Storage shared by every reactive variable.
//!
//! The value lock is held only to snapshot or swap the value. Callbacks and
//! bindings always run after it is released, so a callback may read or write
//! the variable that invoked it.

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use super::binding::{Binding, Pending};
use super::callback::{Change, ReadCallback, WriteCallback};
use crate::graph::{self, NodeId, NodeKind};

pub(crate) struct VarState<T> {
    id: NodeId,
    value: Mutex<Option<T>>,
    reads: RwLock<Vec<ReadCallback<T>>>,
    writes: RwLock<Vec<WriteCallback<T>>>,
    bindings: RwLock<Vec<Binding<T>>>,
}

impl<T> VarState<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            id: graph::register(kind),
            value: Mutex::new(None),
            reads: RwLock::new(Vec::new()),
            writes: RwLock::new(Vec::new()),
            bindings: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    /// Snapshot without notifying anyone.
    pub(crate) fn peek(&self) -> Option<T> {
        self.value.lock().clone()
    }

    /// Snapshot, then fire read callbacks over the snapshot.
    pub(crate) fn read(&self) -> Option<T> {
        let snapshot = self.peek();
        self.notify_read(&snapshot);
        snapshot
    }

    pub(crate) fn notify_read(&self, snapshot: &Option<T>) {
        // Cloned so a callback may register further callbacks.
        let callbacks = self.reads.read().clone();
        for callback in &callbacks {
            callback.invoke(snapshot);
        }
    }

    /// Store `value`, fire write callbacks, and return the binding work.
    pub(crate) fn assign(&self, value: T) -> Pending {
        let previous = self.value.lock().replace(value.clone());
        self.after_write(previous, value)
    }

    /// Mutate the stored value in place under the lock, returning whatever
    /// `f` returns. No callbacks fire.
    pub(crate) fn with_value_mut<R>(&self, f: impl FnOnce(&mut Option<T>) -> R) -> R {
        f(&mut self.value.lock())
    }

    /// Fire write callbacks for a change already stored and schedule bindings.
    pub(crate) fn after_write(&self, previous: Option<T>, current: T) -> Pending {
        let change = Change { previous, current };
        let callbacks = self.writes.read().clone();
        for callback in &callbacks {
            callback.invoke(&change);
        }
        self.schedule(&change.current)
    }

    fn schedule(&self, value: &T) -> Pending {
        let jobs: SmallVec<_> = self
            .bindings
            .read()
            .iter()
            .map(|binding| binding.schedule(value))
            .collect();
        Pending::from_jobs(jobs)
    }

    pub(crate) fn add_read(&self, callback: ReadCallback<T>) {
        self.reads.write().push(callback);
    }

    pub(crate) fn add_write(&self, callback: WriteCallback<T>) {
        self.writes.write().push(callback);
    }

    pub(crate) fn add_binding(&self, binding: Binding<T>) {
        self.bindings.write().push(binding);
    }

    pub(crate) fn binding_count(&self) -> usize {
        self.bindings.read().len()
    }
}

impl<T> Drop for VarState<T> {
    fn drop(&mut self) {
        graph::unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as TestMutex;
    use std::sync::Arc;

    #[test]
    fn starts_empty() {
        let state = VarState::<i32>::new(NodeKind::Trigger);
        assert_eq!(state.peek(), None);
        assert_eq!(state.read(), None);
        assert_eq!(state.binding_count(), 0);
    }

    #[test]
    fn assign_reports_previous_value() {
        let state = VarState::<i32>::new(NodeKind::Trigger);
        let seen = Arc::new(TestMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        state.add_write(WriteCallback::new(move |prev, next| {
            seen_clone.lock().push((prev.copied(), *next));
        }));

        assert!(state.assign(1).is_empty());
        assert!(state.assign(2).is_empty());
        assert_eq!(*seen.lock(), vec![(None, 1), (Some(1), 2)]);
    }

    #[test]
    fn callbacks_may_touch_their_own_variable() {
        let state = Arc::new(VarState::<i32>::new(NodeKind::Trigger));
        let weak = Arc::downgrade(&state);
        state.add_read(ReadCallback::new(move |_| {
            if let Some(state) = weak.upgrade() {
                assert!(state.peek().is_some());
                state.add_read(ReadCallback::new(|_| {}));
            }
        }));

        let _ = state.assign(5);
        assert_eq!(state.read(), Some(5));
    }

    #[test]
    fn drop_unregisters_node() {
        let state = VarState::<u8>::new(NodeKind::Indicator);
        let id = state.id();
        assert!(graph::registry().read().get_node(id).is_some());
        drop(state);
        assert!(graph::registry().read().get_node(id).is_none());
    }
}

//! Trigger Implementation
//!
//! A Trigger is the leaf reactive variable. It holds one value, notifies read
//! and write callbacks, and is the source end of bindings. It never depends
//! on another variable.
//!
//! # How a Write Propagates
//!
//! 1. The value is swapped under the variable's lock.
//! 2. Write callbacks run, in registration order, with the previous and new
//!    values.
//! 3. Every outgoing binding is applied. Immediate bindings complete (with
//!    everything downstream of them) before `set_value` returns; concurrent
//!    bindings are queued on the bind lane.
//!
//! # Cloning
//!
//! `Trigger` is a handle. Clones share the same value, callbacks and
//! bindings.

use std::fmt;
use std::sync::Arc;

use super::binding::{Binding, Reader, Source};
use super::callback::{ReadCallback, WriteCallback};
use super::state::VarState;
use crate::graph::{self, NodeId, NodeKind};

/// A reactive variable holding a value of type `T`.
///
/// # Example
///
/// ```rust
/// use reactor_core::Trigger;
///
/// let trigger = Trigger::<&'static str>::new();
/// trigger.on_write(|prev, next| {
///     println!("written: {next}, previous: {prev:?}");
/// });
///
/// assert_eq!(trigger.value(), None);
/// trigger.set_value("world");
/// trigger.set_value("hello");
/// assert_eq!(trigger.value(), Some("hello"));
/// ```
pub struct Trigger<T> {
    state: Arc<VarState<T>>,
}

impl<T> Trigger<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty trigger.
    pub fn new() -> Self {
        Self {
            state: Arc::new(VarState::new(NodeKind::Trigger)),
        }
    }

    pub fn id(&self) -> NodeId {
        self.state.id()
    }

    /// Read the value and fire read callbacks with it.
    ///
    /// Returns `None` until the first `set_value`.
    pub fn value(&self) -> Option<T> {
        self.state.read()
    }

    /// Read the value without firing read callbacks.
    pub fn peek(&self) -> Option<T> {
        self.state.peek()
    }

    /// Store `value`, fire write callbacks, and propagate to bindings.
    pub fn set_value(&self, value: T) {
        self.state.assign(value).run();
    }

    /// Replace the value with `f(current)`, as one `set_value`.
    ///
    /// The read and the write are separate steps; a concurrent writer may
    /// slip in between them.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(Option<&T>) -> T,
    {
        let next = f(self.peek().as_ref());
        self.set_value(next);
    }

    pub fn add_read_callback(&self, callback: ReadCallback<T>) {
        self.state.add_read(callback);
    }

    pub fn add_write_callback(&self, callback: WriteCallback<T>) {
        self.state.add_write(callback);
    }

    /// Shorthand for `add_read_callback(ReadCallback::new(f))`.
    pub fn on_read<F>(&self, f: F)
    where
        F: Fn(Option<&T>) + Send + Sync + 'static,
    {
        self.add_read_callback(ReadCallback::new(f));
    }

    /// Shorthand for `add_write_callback(WriteCallback::new(f))`.
    pub fn on_write<F>(&self, f: F)
    where
        F: Fn(Option<&T>, &T) + Send + Sync + 'static,
    {
        self.add_write_callback(WriteCallback::new(f));
    }

    /// Number of outgoing bindings.
    pub fn binding_count(&self) -> usize {
        self.state.binding_count()
    }

    /// Every variable bound, directly or transitively, to this one.
    pub fn dependents(&self) -> Vec<NodeId> {
        graph::downstream(self.id())
    }
}

impl<T> Default for Trigger<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Trigger<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Source<T> for Trigger<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn value(&self) -> Option<T> {
        Trigger::value(self)
    }

    fn add_binder(&self, binding: Binding<T>) {
        self.state.add_binding(binding);
    }

    fn reader(&self) -> Reader<T> {
        let state = Arc::downgrade(&self.state);
        Box::new(move || state.upgrade().and_then(|state| state.read()))
    }
}

impl<T> fmt::Debug for Trigger<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.id())
            .field("value", &self.peek())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn empty_until_first_write() {
        let trigger = Trigger::<i32>::new();
        let reads = Arc::new(Mutex::new(Vec::new()));
        let reads_clone = reads.clone();
        trigger.on_read(move |v| reads_clone.lock().push(v.copied()));

        assert_eq!(trigger.value(), None);
        trigger.set_value(4);
        assert_eq!(trigger.value(), Some(4));

        assert_eq!(*reads.lock(), vec![None, Some(4)]);
    }

    #[test]
    fn write_callbacks_see_each_transition() {
        let trigger = Trigger::<&'static str>::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        trigger.on_write(move |prev, next| {
            log_clone.lock().push(format!("{:?} -> {}", prev, next));
        });

        trigger.set_value("world");
        trigger.set_value("hello");

        assert_eq!(*log.lock(), vec!["None -> world", "Some(\"world\") -> hello"]);
    }

    #[test]
    fn callbacks_run_in_registration_order() {
        let trigger = Trigger::<u8>::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..4 {
            let order = order.clone();
            trigger.on_read(move |_| order.lock().push(n));
        }

        trigger.value();
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn peek_does_not_notify() {
        let trigger = Trigger::<i32>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        trigger.on_read(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        trigger.set_value(1);
        assert_eq!(trigger.peek(), Some(1));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn update_reads_then_writes() {
        let trigger = Trigger::<i32>::new();
        let writes = Arc::new(AtomicUsize::new(0));
        let writes_clone = writes.clone();
        trigger.on_write(move |_, _| {
            writes_clone.fetch_add(1, Ordering::SeqCst);
        });

        trigger.update(|v| v.copied().unwrap_or(0) + 1);
        trigger.update(|v| v.copied().unwrap_or(0) + 1);
        assert_eq!(trigger.peek(), Some(2));
        assert_eq!(writes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clones_share_state() {
        let a = Trigger::<String>::new();
        let b = a.clone();
        b.set_value("shared".to_string());

        assert_eq!(a.id(), b.id());
        assert_eq!(a.peek().as_deref(), Some("shared"));
    }

    #[test]
    fn write_callback_may_write_elsewhere() {
        let source = Trigger::<i32>::new();
        let mirror = Trigger::<i32>::new();
        let mirror_clone = mirror.clone();
        source.on_write(move |_, next| mirror_clone.set_value(next * 3));

        source.set_value(2);
        assert_eq!(mirror.peek(), Some(6));
        assert_eq!(source.binding_count(), 0);
        assert!(source.dependents().is_empty());
    }
}

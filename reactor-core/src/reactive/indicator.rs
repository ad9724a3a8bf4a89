//! Indicator Implementation
//!
//! An Indicator is a reactive variable whose value can be derived from other
//! variables. It has the same read/write/callback surface as a Trigger and
//! can itself be a binding source, so indicators chain.
//!
//! # Binding Modes
//!
//! - **Immediate** (`add_binding`, `add_trivial_binding`): the source pushes
//!   `transform(new)` into this indicator on every write, before the
//!   source's `set_value` returns.
//!
//! - **Delayed** (`add_delayed_binding`): nothing happens on source writes.
//!   When this indicator is read, every delayed source is read and
//!   transformed in registration order; the last result is written with
//!   `set_value` and the earlier ones are discarded. Delayed sources that are
//!   themselves indicators settle first, deepest first, on an explicit stack.
//!   A delayed binding holds its source weakly, like the other modes hold
//!   their target, so dropping either end retires it.
//!
//! - **Concurrent** (`add_concurrent_binding`): the source captures the
//!   written value and queues it on the hub's bind lane. The lane's consumer
//!   applies the transform and writes the result here later.
//!
//! Every registration first records its edge in the binding graph and fails
//! with [`ReactorError::Cycle`](crate::ReactorError::Cycle) if the edge would
//! close a loop, in which case nothing is registered.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;

use super::binding::{self, BindMode, Binder, Binding, Pending, Reader, Resolve, Source};
use super::callback::{ReadCallback, WriteCallback};
use super::state::VarState;
use crate::dispatch::{DispatchHub, QueueKind};
use crate::error::ReactorResult;
use crate::graph::{self, NodeId, NodeKind};

/// A delayed binding, owned by the dependent side.
struct Delayed<U> {
    pull: Reader<U>,
    upstream: Option<Weak<dyn Resolve>>,
}

struct IndicatorInner<U> {
    state: VarState<U>,
    delayed: RwLock<Vec<Arc<Delayed<U>>>>,
}

impl<U> Resolve for IndicatorInner<U>
where
    U: Clone + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.state.id()
    }

    fn upstream(&self) -> Vec<Arc<dyn Resolve>> {
        self.delayed
            .read()
            .iter()
            .filter_map(|link| link.upstream.as_ref().and_then(Weak::upgrade))
            .collect()
    }

    fn settle(&self) {
        let links = self.delayed.read().clone();
        let mut last = None;
        for link in &links {
            last = (link.pull)();
        }

        // An empty source has nothing to transform.
        if let Some(value) = last {
            self.state.assign(value).run();
        }
    }
}

impl<U> Binder<U> for IndicatorInner<U>
where
    U: Clone + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.state.id()
    }

    fn apply(&self, value: U) -> Pending {
        self.state.assign(value)
    }
}

/// A derived reactive variable holding a value of type `U`.
///
/// # Example
///
/// ```rust
/// use reactor_core::{Indicator, Trigger};
///
/// let trigger = Trigger::<i32>::new();
/// let doubled = Indicator::<i32>::new();
/// doubled.add_binding(&trigger, |v| v * 2).unwrap();
///
/// trigger.set_value(10);
/// assert_eq!(doubled.value(), Some(20));
/// ```
pub struct Indicator<U> {
    inner: Arc<IndicatorInner<U>>,
}

impl<U> Indicator<U>
where
    U: Clone + Send + Sync + 'static,
{
    /// Create an empty indicator with no bindings.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(IndicatorInner {
                state: VarState::new(NodeKind::Indicator),
                delayed: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.state.id()
    }

    /// Resolve delayed bindings, then read the value and fire read callbacks.
    pub fn value(&self) -> Option<U> {
        self.resolve_delayed();
        self.inner.state.read()
    }

    /// Read the stored value without resolving delayed bindings or firing
    /// read callbacks.
    pub fn peek(&self) -> Option<U> {
        self.inner.state.peek()
    }

    /// Store `value`, fire write callbacks, and propagate to bindings.
    pub fn set_value(&self, value: U) {
        self.inner.state.assign(value).run();
    }

    fn resolve_delayed(&self) {
        if self.inner.delayed.read().is_empty() {
            return;
        }
        let settled = binding::resolve(self.inner.clone());
        trace!(node = %self.id(), settled, "delayed bindings resolved");
    }

    fn as_binder(&self) -> Weak<dyn Binder<U>> {
        let binder: Arc<dyn Binder<U>> = self.inner.clone();
        Arc::downgrade(&binder)
    }

    fn link<T>(&self, source: &dyn Source<T>, mode: BindMode) -> ReactorResult<()> {
        graph::link(source.node_id(), self.id())?;
        trace!(source = %source.node_id(), target = %self.id(), mode = mode.as_str(), "binding added");
        Ok(())
    }

    /// Bind to `source`: every write to `source` sets this indicator to
    /// `transform(new)` before the write returns.
    pub fn add_binding<T, S, F>(&self, source: &S, transform: F) -> ReactorResult<()>
    where
        T: Clone + Send + Sync + 'static,
        S: Source<T>,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.link(source, BindMode::Immediate)?;
        source.add_binder(Binding::immediate(self.as_binder(), transform));
        Ok(())
    }

    /// [`add_binding`](Self::add_binding) with the identity transform.
    pub fn add_trivial_binding<S>(&self, source: &S) -> ReactorResult<()>
    where
        S: Source<U>,
    {
        self.add_binding(source, U::clone)
    }

    /// Bind to `source` lazily: `transform` runs only when this indicator is
    /// read, over the source's value at that moment.
    pub fn add_delayed_binding<T, S, F>(&self, source: &S, transform: F) -> ReactorResult<()>
    where
        T: Clone + Send + Sync + 'static,
        S: Source<T>,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.link(source, BindMode::Delayed)?;
        let read = source.reader();
        self.inner.delayed.write().push(Arc::new(Delayed {
            pull: Box::new(move || read().map(|v| transform(&v))),
            upstream: source.resolver(),
        }));
        Ok(())
    }

    /// Bind to `source` through `hub`'s bind lane. The value written to
    /// `source` is captured at write time; `transform` and the write to this
    /// indicator happen later on the lane's consumer.
    pub fn add_concurrent_binding<T, S, F>(
        &self,
        source: &S,
        transform: F,
        hub: &Arc<DispatchHub>,
    ) -> ReactorResult<()>
    where
        T: Clone + Send + Sync + 'static,
        S: Source<T>,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.link(source, BindMode::Concurrent)?;
        hub.arm_or_warn(QueueKind::Bind);
        source.add_binder(Binding::concurrent(self.as_binder(), transform, hub));
        Ok(())
    }

    pub fn add_read_callback(&self, callback: ReadCallback<U>) {
        self.inner.state.add_read(callback);
    }

    pub fn add_write_callback(&self, callback: WriteCallback<U>) {
        self.inner.state.add_write(callback);
    }

    pub fn on_read<F>(&self, f: F)
    where
        F: Fn(Option<&U>) + Send + Sync + 'static,
    {
        self.add_read_callback(ReadCallback::new(f));
    }

    pub fn on_write<F>(&self, f: F)
    where
        F: Fn(Option<&U>, &U) + Send + Sync + 'static,
    {
        self.add_write_callback(WriteCallback::new(f));
    }

    /// Number of outgoing bindings (this indicator as source).
    pub fn binding_count(&self) -> usize {
        self.inner.state.binding_count()
    }

    /// Number of delayed bindings this indicator resolves on read.
    pub fn delayed_count(&self) -> usize {
        self.inner.delayed.read().len()
    }

    /// Every variable bound, directly or transitively, to this one.
    pub fn dependents(&self) -> Vec<NodeId> {
        graph::downstream(self.id())
    }
}

impl<U> Default for Indicator<U>
where
    U: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<U> Clone for Indicator<U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<U> Source<U> for Indicator<U>
where
    U: Clone + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn value(&self) -> Option<U> {
        Indicator::value(self)
    }

    fn add_binder(&self, binding: Binding<U>) {
        self.inner.state.add_binding(binding);
    }

    fn reader(&self) -> Reader<U> {
        let inner = Arc::downgrade(&self.inner);
        Box::new(move || inner.upgrade().and_then(|inner| inner.state.read()))
    }

    fn resolver(&self) -> Option<Weak<dyn Resolve>> {
        let inner: Arc<dyn Resolve> = self.inner.clone();
        Some(Arc::downgrade(&inner))
    }
}

impl<U> fmt::Debug for Indicator<U>
where
    U: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indicator")
            .field("id", &self.id())
            .field("value", &self.peek())
            .field("delayed", &self.delayed_count())
            .finish()
    }
}

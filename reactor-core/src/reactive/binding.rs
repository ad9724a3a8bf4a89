//! Binding records and the propagation worklist.
//!
//! A write never calls into its dependents directly. Instead it returns a
//! [`Pending`] list with one job per outgoing binding; running a job applies
//! the transformed value to the target and yields the target's own pending
//! work. [`Pending::run`] drains this depth-first with an explicit stack, so
//! a long binding chain costs heap, not call stack, and dependents are
//! visited in the same order a recursive walk would visit them.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use smallvec::SmallVec;
use tracing::trace;

use crate::dispatch::{DispatchHub, QueueKind};
use crate::graph::NodeId;

/// One step of propagation. Running it yields the next steps.
pub(crate) type Job = Box<dyn FnOnce() -> Pending>;

/// Propagation work produced by a write and not yet performed.
#[must_use = "propagation only happens when the pending work is run"]
pub struct Pending {
    jobs: SmallVec<[Job; 2]>,
}

impl Pending {
    pub fn none() -> Self {
        Self {
            jobs: SmallVec::new(),
        }
    }

    pub(crate) fn from_jobs(jobs: SmallVec<[Job; 2]>) -> Self {
        Self { jobs }
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs at the top level, not counting work they produce.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Perform all propagation, depth-first in binding registration order.
    /// Returns the number of jobs run.
    pub fn run(self) -> usize {
        let mut stack: Vec<Job> = self.jobs.into_iter().rev().collect();
        let mut steps = 0;

        while let Some(job) = stack.pop() {
            steps += 1;
            let next = job();
            stack.extend(next.jobs.into_iter().rev());
        }

        steps
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").field("jobs", &self.jobs.len()).finish()
    }
}

/// How a binding moves values from its source to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindMode {
    /// Applied synchronously on every source write.
    Immediate,
    /// Pulled from the source when the target is read.
    Delayed,
    /// Queued on the bind lane with the value captured at write time.
    Concurrent,
}

impl BindMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindMode::Immediate => "immediate",
            BindMode::Delayed => "delayed",
            BindMode::Concurrent => "concurrent",
        }
    }
}

/// Something a binding can write into.
pub trait Binder<U>: Send + Sync {
    fn node_id(&self) -> NodeId;

    /// Store `value` and return the propagation it causes.
    fn apply(&self, value: U) -> Pending;
}

/// Reads a source for a delayed binding. Holds the source weakly and yields
/// `None` once it is gone.
pub type Reader<T> = Box<dyn Fn() -> Option<T> + Send + Sync>;

/// Something that can be bound from.
pub trait Source<T>: Send + Sync {
    fn node_id(&self) -> NodeId;

    /// Read the value, firing read callbacks.
    fn value(&self) -> Option<T>;

    /// Attach an outgoing binding. Normally called through an Indicator's
    /// `add_*_binding` methods, which also record the edge.
    fn add_binder(&self, binding: Binding<T>);

    /// A reader for delayed bindings. It fires read callbacks like
    /// [`value`](Self::value) but never resolves this source's own delayed
    /// bindings; those are settled beforehand through
    /// [`resolver`](Self::resolver).
    fn reader(&self) -> Reader<T>;

    /// This source's delayed bindings, if it has any.
    fn resolver(&self) -> Option<Weak<dyn Resolve>> {
        None
    }
}

/// One variable's delayed bindings, as seen by the resolution walk.
///
/// Reading an indicator walks its delayed sources upstream with an explicit
/// stack and settles them deepest first, so no variable's read recurses into
/// another's.
pub trait Resolve: Send + Sync {
    fn node_id(&self) -> NodeId;

    /// Delayed sources that must settle before this one, in registration order.
    fn upstream(&self) -> Vec<Arc<dyn Resolve>>;

    /// Pull every delayed source and write the last result, if any.
    fn settle(&self);
}

/// Settle `root` and everything it reaches through delayed bindings, sources
/// before dependents. A variable reachable along several paths settles once.
/// Returns the number of variables settled.
pub(crate) fn resolve(root: Arc<dyn Resolve>) -> usize {
    let mut order: Vec<Arc<dyn Resolve>> = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(root, false)];

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(node.node_id()) {
            continue;
        }
        let upstream = node.upstream();
        stack.push((node, true));
        stack.extend(upstream.into_iter().rev().map(|source| (source, false)));
    }

    for node in &order {
        node.settle();
    }
    order.len()
}

type Schedule<T> = Arc<dyn Fn(&T) -> Job + Send + Sync>;

/// An outgoing binding, owned by its source.
pub struct Binding<T> {
    target: NodeId,
    mode: BindMode,
    schedule: Schedule<T>,
}

impl<T> Binding<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Apply `transform(value)` to `target` as part of the writer's propagation.
    pub fn immediate<U, F>(target: Weak<dyn Binder<U>>, transform: F) -> Self
    where
        U: 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let target_id = binder_id(&target);
        let transform = Arc::new(transform);

        Self {
            target: target_id,
            mode: BindMode::Immediate,
            schedule: Arc::new(move |value: &T| -> Job {
                let target = target.clone();
                let transform = Arc::clone(&transform);
                let value = value.clone();
                Box::new(move || match target.upgrade() {
                    Some(binder) => binder.apply(transform(&value)),
                    None => Pending::none(),
                })
            }),
        }
    }

    /// Hand the written value to `hub`'s bind lane; the lane's consumer
    /// applies `transform` and propagates from the target.
    pub fn concurrent<U, F>(target: Weak<dyn Binder<U>>, transform: F, hub: &Arc<DispatchHub>) -> Self
    where
        U: 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let target_id = binder_id(&target);
        let transform = Arc::new(transform);
        let hub = Arc::clone(hub);

        Self {
            target: target_id,
            mode: BindMode::Concurrent,
            schedule: Arc::new(move |value: &T| -> Job {
                let target = target.clone();
                let transform = Arc::clone(&transform);
                let hub = Arc::clone(&hub);
                let captured = value.clone();
                Box::new(move || {
                    trace!(target = %target_id, "queueing concurrent binding");
                    hub.enqueue(
                        QueueKind::Bind,
                        Box::new(move || {
                            if let Some(binder) = target.upgrade() {
                                binder.apply(transform(&captured)).run();
                            }
                        }),
                    );
                    Pending::none()
                })
            }),
        }
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn mode(&self) -> BindMode {
        self.mode
    }

    pub(crate) fn schedule(&self, value: &T) -> Job {
        (self.schedule)(value)
    }
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            target: self.target,
            mode: self.mode,
            schedule: Arc::clone(&self.schedule),
        }
    }
}

impl<T> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("target", &self.target)
            .field("mode", &self.mode)
            .finish()
    }
}

fn binder_id<U>(target: &Weak<dyn Binder<U>>) -> NodeId {
    target
        .upgrade()
        .map_or_else(NodeId::default, |binder| binder.node_id())
}

//! Callbacks and their dispatch stages.
//!
//! A [`Callback`] is a base function plus an ordered chain of stages that
//! decide where and whether the base runs:
//!
//! - [`asynchronous`](Callback::asynchronous): spawn onto the hub's runtime
//!   as a blocking task.
//! - [`concurrent`](Callback::concurrent): push onto the hub's lane for the
//!   callback's category and return.
//! - [`conditional`](Callback::conditional) / [`when`](Callback::when): run
//!   only if a predicate over the payload holds.
//!
//! Each builder call wraps what is already there, so the stage added last is
//! evaluated first:
//!
//! ```rust,ignore
//! // Predicate runs on the caller; the body runs on the read lane.
//! let cb = ReadCallback::new(|v: Option<&i32>| println!("{v:?}"))
//!     .concurrent(&hub)
//!     .conditional(|v| v.is_some());
//! ```
//!
//! Stages that leave the calling thread clone the payload, so the callback
//! sees the value as it was at the moment of the event.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::dispatch::{DispatchHub, QueueKind};

/// Payload of a write notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change<T> {
    /// The value before the write; `None` if the variable had no value.
    pub previous: Option<T>,
    pub current: T,
}

type BaseFn<P> = Arc<dyn Fn(&P) + Send + Sync>;
type Predicate<P> = Arc<dyn Fn(&P) -> bool + Send + Sync>;

enum Stage<P> {
    Async(Arc<DispatchHub>),
    Queued(Arc<DispatchHub>),
    When(Predicate<P>),
}

impl<P> Clone for Stage<P> {
    fn clone(&self) -> Self {
        match self {
            Stage::Async(hub) => Stage::Async(Arc::clone(hub)),
            Stage::Queued(hub) => Stage::Queued(Arc::clone(hub)),
            Stage::When(predicate) => Stage::When(Arc::clone(predicate)),
        }
    }
}

struct Chain<P> {
    lane: QueueKind,
    base: BaseFn<P>,
    stages: SmallVec<[Stage<P>; 2]>,
}

impl<P> Clone for Chain<P> {
    fn clone(&self) -> Self {
        Self {
            lane: self.lane,
            base: Arc::clone(&self.base),
            stages: self.stages.clone(),
        }
    }
}

impl<P> Chain<P>
where
    P: Clone + Send + Sync + 'static,
{
    /// Run the chain with the first `depth` stages still to apply.
    fn run(this: &Arc<Self>, depth: usize, payload: &P) {
        let Some(inner) = depth.checked_sub(1) else {
            (this.base)(payload);
            return;
        };

        match &this.stages[inner] {
            Stage::When(predicate) => {
                if predicate(payload) {
                    Self::run(this, inner, payload);
                }
            }
            Stage::Async(hub) => {
                let chain = Arc::clone(this);
                let payload = payload.clone();
                hub.spawn(Box::new(move || Self::run(&chain, inner, &payload)));
            }
            Stage::Queued(hub) => {
                let chain = Arc::clone(this);
                let payload = payload.clone();
                hub.enqueue(
                    this.lane,
                    Box::new(move || Self::run(&chain, inner, &payload)),
                );
            }
        }
    }
}

/// A notification function together with its dispatch stages.
pub struct Callback<P> {
    chain: Arc<Chain<P>>,
}

/// Callback fired by `value()` with the value read (or `None`).
pub type ReadCallback<T> = Callback<Option<T>>;

/// Callback fired by `set_value()` with the previous and new values.
pub type WriteCallback<T> = Callback<Change<T>>;

impl<P> Clone for Callback<P> {
    fn clone(&self) -> Self {
        Self {
            chain: Arc::clone(&self.chain),
        }
    }
}

impl<P> Callback<P>
where
    P: Clone + Send + Sync + 'static,
{
    /// A callback over an arbitrary payload. `lane` selects the queue used
    /// if the callback is later made [`concurrent`](Self::concurrent).
    pub fn from_fn<F>(lane: QueueKind, f: F) -> Self
    where
        F: Fn(&P) + Send + Sync + 'static,
    {
        Self {
            chain: Arc::new(Chain {
                lane,
                base: Arc::new(f),
                stages: SmallVec::new(),
            }),
        }
    }

    fn push(mut self, stage: Stage<P>) -> Self {
        Arc::make_mut(&mut self.chain).stages.push(stage);
        self
    }

    /// Run in an independent task on `hub`'s runtime and return immediately.
    pub fn asynchronous(self, hub: &Arc<DispatchHub>) -> Self {
        self.push(Stage::Async(Arc::clone(hub)))
    }

    /// Queue on `hub`'s lane for this callback's category and return
    /// immediately. The lane is armed now if it is not already.
    pub fn concurrent(self, hub: &Arc<DispatchHub>) -> Self {
        hub.arm_or_warn(self.chain.lane);
        self.push(Stage::Queued(Arc::clone(hub)))
    }

    /// Run only when `predicate` holds for the payload.
    pub fn when<F>(self, predicate: F) -> Self
    where
        F: Fn(&P) -> bool + Send + Sync + 'static,
    {
        self.push(Stage::When(Arc::new(predicate)))
    }

    /// Deliver `payload` through the stage chain.
    pub fn invoke(&self, payload: &P) {
        Chain::run(&self.chain, self.chain.stages.len(), payload);
    }

    pub fn lane(&self) -> QueueKind {
        self.chain.lane
    }

    /// Number of stages wrapped around the base function.
    pub fn depth(&self) -> usize {
        self.chain.stages.len()
    }
}

impl<T> Callback<Option<T>>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<&T>) + Send + Sync + 'static,
    {
        Self::from_fn(QueueKind::Read, move |value: &Option<T>| f(value.as_ref()))
    }

    /// Run only when `predicate` holds for the value read.
    pub fn conditional<F>(self, predicate: F) -> Self
    where
        F: Fn(Option<&T>) -> bool + Send + Sync + 'static,
    {
        self.when(move |value: &Option<T>| predicate(value.as_ref()))
    }
}

impl<T> Callback<Change<T>>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<&T>, &T) + Send + Sync + 'static,
    {
        Self::from_fn(QueueKind::Write, move |change: &Change<T>| {
            f(change.previous.as_ref(), &change.current)
        })
    }

    /// Run only when `predicate` holds for the previous and new values.
    pub fn conditional<F>(self, predicate: F) -> Self
    where
        F: Fn(Option<&T>, &T) -> bool + Send + Sync + 'static,
    {
        self.when(move |change: &Change<T>| predicate(change.previous.as_ref(), &change.current))
    }
}

impl<P> fmt::Debug for Callback<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("lane", &self.chain.lane)
            .field("stages", &self.chain.stages.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn hub() -> Arc<DispatchHub> {
        DispatchHub::new(DispatchConfig::default()).unwrap()
    }

    #[test]
    fn plain_callback_runs_inline() {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let cb = ReadCallback::<i32>::new(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        cb.invoke(&Some(1));
        cb.invoke(&None);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(cb.lane(), QueueKind::Read);
        assert_eq!(cb.depth(), 0);
    }

    #[test]
    fn conditional_read_filters() {
        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = seen.clone();
        let cb = ReadCallback::<i32>::new(move |v| {
            seen_clone.fetch_add(*v.unwrap(), Ordering::SeqCst);
        })
        .conditional(|v| v.is_some_and(|n| *n > 2));

        for n in [1, 2, 3, 4] {
            cb.invoke(&Some(n));
        }
        cb.invoke(&None);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn conditional_write_sees_both_values() {
        let hits = Arc::new(AtomicI32::new(0));
        let hits_clone = hits.clone();
        let cb = WriteCallback::<i32>::new(move |_, _| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        })
        .conditional(|prev, next| prev.is_some_and(|p| next - p == 2));

        cb.invoke(&Change { previous: None, current: 1 });
        cb.invoke(&Change { previous: Some(1), current: 3 });
        cb.invoke(&Change { previous: Some(3), current: 4 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(cb.lane(), QueueKind::Write);
    }

    #[test]
    fn asynchronous_runs_elsewhere() {
        let hub = hub();
        let (tx, rx) = mpsc::channel();
        let caller = std::thread::current().id();
        let cb = ReadCallback::<i32>::new(move |v| {
            tx.send((std::thread::current().id(), v.copied())).unwrap();
        })
        .asynchronous(&hub);

        cb.invoke(&Some(9));
        let (thread, value) = rx.recv_timeout(WAIT).unwrap();
        assert_ne!(thread, caller);
        assert_eq!(value, Some(9));
    }

    #[test]
    fn concurrent_preserves_order() {
        let hub = hub();
        let (tx, rx) = mpsc::channel();
        let cb = WriteCallback::<i32>::new(move |prev, next| {
            tx.send((prev.copied(), *next)).unwrap();
        })
        .concurrent(&hub);
        assert!(hub.is_armed(QueueKind::Write));

        let mut prev = None;
        for n in 0..50 {
            cb.invoke(&Change { previous: prev, current: n });
            prev = Some(n);
        }

        let mut expected_prev = None;
        for n in 0..50 {
            let (p, v) = rx.recv_timeout(WAIT).unwrap();
            assert_eq!(p, expected_prev);
            assert_eq!(v, n);
            expected_prev = Some(n);
        }
    }

    #[test]
    fn condition_outside_queue_is_checked_by_caller() {
        let hub = hub();
        let checks = Arc::new(AtomicI32::new(0));
        let checks_clone = checks.clone();
        let (tx, rx) = mpsc::channel();

        let cb = ReadCallback::<i32>::new(move |v| tx.send(v.copied()).unwrap())
            .concurrent(&hub)
            .conditional(move |v| {
                checks_clone.fetch_add(1, Ordering::SeqCst);
                v == Some(&2)
            });
        assert_eq!(cb.depth(), 2);

        cb.invoke(&Some(1));
        cb.invoke(&Some(2));
        // Both predicate calls happened before invoke returned.
        assert_eq!(checks.load(Ordering::SeqCst), 2);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), Some(2));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn clones_share_the_chain() {
        let cb = ReadCallback::<i32>::new(|_| {}).when(|_| true);
        let copy = cb.clone();
        let extended = copy.when(|_| false);

        assert_eq!(cb.depth(), 1);
        assert_eq!(extended.depth(), 2);
    }
}

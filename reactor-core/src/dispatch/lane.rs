//! A single dispatch lane: one bounded FIFO and the thread that drains it.
//!
//! # Lifecycle
//!
//! A lane starts unarmed. The first `arm` or `enqueue` creates the channel
//! and spawns the consumer. `shutdown` clears the lane's handle; producers
//! that already cloned the handle may still push, and the consumer keeps
//! draining until the last handle is gone and the channel is empty. The next
//! `arm` or `enqueue` starts a fresh channel and consumer.
//!
//! # Re-entrancy
//!
//! A task running on the consumer may enqueue onto its own lane. If the
//! channel is full at that moment a blocking send would never complete, so
//! everything currently queued is moved to a backlog local to the consumer
//! thread and the new task is appended after it. The consumer drains the
//! backlog before the channel, which keeps arrival order intact.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::QueueKind;
use crate::error::ReactorResult;

/// A unit of queued work: the payload and its callback, moved together.
pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

static LANE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// Set on consumer threads only.
    static ACTIVE_LANE: RefCell<Option<ActiveLane>> = const { RefCell::new(None) };
}

struct ActiveLane {
    id: u64,
    backlog: VecDeque<Task>,
}

/// A live channel for one lane. Cloned by producers for the duration of a push.
pub(crate) struct LaneHandle {
    id: u64,
    kind: QueueKind,
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

impl LaneHandle {
    /// Push a task, blocking while the lane is full.
    pub(crate) fn push(&self, task: Task) {
        let task = match self.sender.try_send(task) {
            Ok(()) => return,
            Err(TrySendError::Full(task)) => task,
            Err(TrySendError::Disconnected(_)) => {
                warn!(lane = self.kind.as_str(), "lane consumer is gone; dropping task");
                return;
            }
        };

        let mut task = Some(task);
        ACTIVE_LANE.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(lane) = active.as_mut().filter(|lane| lane.id == self.id) {
                lane.backlog.extend(self.receiver.try_iter());
                lane.backlog.extend(task.take());
            }
        });

        if let Some(task) = task {
            trace!(lane = self.kind.as_str(), "lane full; producer blocking");
            if self.sender.send(task).is_err() {
                warn!(lane = self.kind.as_str(), "lane consumer is gone; dropping task");
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.sender.len()
    }
}

/// One category of queued work.
pub(crate) struct Lane {
    kind: QueueKind,
    capacity: usize,
    thread_name: String,
    slot: Mutex<Option<Arc<LaneHandle>>>,
}

impl Lane {
    pub(crate) fn new(kind: QueueKind, capacity: usize, thread_prefix: &str) -> Self {
        Self {
            kind,
            capacity,
            thread_name: format!("{}-{}", thread_prefix, kind.as_str()),
            slot: Mutex::new(None),
        }
    }

    /// The current handle, creating the channel and consumer if needed.
    pub(crate) fn handle(&self) -> ReactorResult<Arc<LaneHandle>> {
        let mut slot = self.slot.lock();
        if let Some(handle) = slot.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let id = LANE_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = bounded(self.capacity);
        let consumer = receiver.clone();
        let kind = self.kind;

        thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || run_consumer(id, kind, consumer))?;

        debug!(lane = kind.as_str(), id, capacity = self.capacity, "dispatch lane armed");

        let handle = Arc::new(LaneHandle {
            id,
            kind,
            sender,
            receiver,
        });
        *slot = Some(Arc::clone(&handle));
        Ok(handle)
    }

    pub(crate) fn enqueue(&self, task: Task) {
        match self.handle() {
            Ok(handle) => {
                trace!(lane = self.kind.as_str(), queued = handle.len(), "enqueue");
                handle.push(task);
            }
            Err(err) => {
                // Without a consumer the only way to honour the callback is inline.
                error!(lane = self.kind.as_str(), %err, "cannot arm lane; running task inline");
                task();
            }
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Queued items not yet taken by the consumer.
    pub(crate) fn pending(&self) -> usize {
        self.slot.lock().as_ref().map_or(0, |handle| handle.len())
    }

    /// Clear the handle. Returns whether the lane was armed.
    pub(crate) fn shutdown(&self) -> bool {
        let released = self.slot.lock().take();
        if released.is_some() {
            debug!(lane = self.kind.as_str(), "dispatch lane torn down");
        }
        released.is_some()
    }
}

fn run_consumer(id: u64, kind: QueueKind, receiver: Receiver<Task>) {
    ACTIVE_LANE.with(|active| {
        *active.borrow_mut() = Some(ActiveLane {
            id,
            backlog: VecDeque::new(),
        });
    });

    loop {
        let next = ACTIVE_LANE.with(|active| {
            active
                .borrow_mut()
                .as_mut()
                .and_then(|lane| lane.backlog.pop_front())
        });

        let task = match next {
            Some(task) => task,
            None => match receiver.recv() {
                Ok(task) => task,
                Err(_) => break,
            },
        };

        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!(lane = kind.as_str(), id, "queued callback panicked");
        }
    }

    ACTIVE_LANE.with(|active| active.borrow_mut().take());
    debug!(lane = kind.as_str(), id, "dispatch lane drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn lane_runs_tasks_in_order() {
        let lane = Lane::new(QueueKind::Read, 4, "test");
        let (tx, rx) = mpsc::channel();

        for i in 0..20 {
            let tx = tx.clone();
            lane.enqueue(Box::new(move || tx.send(i).unwrap()));
        }

        let seen: Vec<i32> = (0..20).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
        lane.shutdown();
    }

    #[test]
    fn lane_is_lazy_and_rearms() {
        let lane = Lane::new(QueueKind::Write, 2, "test");
        assert!(!lane.is_armed());

        lane.handle().unwrap();
        assert!(lane.is_armed());

        assert!(lane.shutdown());
        assert!(!lane.is_armed());
        assert!(!lane.shutdown());

        let (tx, rx) = mpsc::channel();
        lane.enqueue(Box::new(move || tx.send(()).unwrap()));
        rx.recv_timeout(WAIT).unwrap();
        assert!(lane.is_armed());
        lane.shutdown();
    }

    #[test]
    fn full_lane_blocks_producer_until_consumer_frees_space() {
        let lane = Arc::new(Lane::new(QueueKind::Write, 1, "test"));
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();
        let (tx, rx) = mpsc::channel();

        lane.enqueue(Box::new(move || {
            started_tx.send(()).unwrap();
            let _ = gate_rx.recv();
        }));
        started_rx.recv_timeout(WAIT).unwrap();

        // The consumer is parked on the gate, so this fills the only slot.
        let first = tx.clone();
        lane.enqueue(Box::new(move || first.send(1).unwrap()));

        let returned = Arc::new(AtomicBool::new(false));
        let producer = {
            let lane = Arc::clone(&lane);
            let returned = Arc::clone(&returned);
            thread::spawn(move || {
                lane.enqueue(Box::new(move || tx.send(2).unwrap()));
                returned.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!returned.load(Ordering::SeqCst));
        assert_eq!(lane.pending(), 1);

        gate_tx.send(()).unwrap();
        producer.join().unwrap();
        assert!(returned.load(Ordering::SeqCst));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 1);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);
        lane.shutdown();
    }

    #[test]
    fn handle_held_across_shutdown_still_delivers() {
        let lane = Lane::new(QueueKind::Bind, 2, "test");
        let handle = lane.handle().unwrap();
        lane.shutdown();

        let (tx, rx) = mpsc::channel();
        handle.push(Box::new(move || tx.send(7).unwrap()));
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 7);
    }

    #[test]
    fn consumer_can_flood_its_own_lane() {
        let lane = Arc::new(Lane::new(QueueKind::Bind, 1, "test"));
        let (tx, rx) = mpsc::channel();

        let inner_lane = Arc::clone(&lane);
        let inner_tx = tx.clone();
        lane.enqueue(Box::new(move || {
            for i in 0..10 {
                let tx = inner_tx.clone();
                inner_lane.enqueue(Box::new(move || tx.send(i).unwrap()));
            }
        }));

        let seen: Vec<i32> = (0..10).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
        lane.shutdown();
    }

    #[test]
    fn panicking_task_does_not_kill_consumer() {
        let lane = Lane::new(QueueKind::Read, 2, "test");
        let (tx, rx) = mpsc::channel();

        lane.enqueue(Box::new(|| panic!("boom")));
        lane.enqueue(Box::new(move || tx.send(1).unwrap()));

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 1);
        lane.shutdown();
    }
}

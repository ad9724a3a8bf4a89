//! Callback Dispatch
//!
//! Reactive variables run most callbacks inline. Two disciplines move work
//! elsewhere, and both go through a [`DispatchHub`]:
//!
//! - **Async**: the callback is spawned as an independent task on the
//!   blocking pool of the hub's tokio runtime. Callbacks are plain closures
//!   and may block, so they never occupy an async worker. No ordering
//!   between async invocations.
//!
//! - **Queued** (concurrent): the callback and its payload are pushed onto
//!   the lane for their category ([`QueueKind`]). Each lane is a bounded
//!   FIFO drained by exactly one consumer thread, so queued work within a
//!   category runs one item at a time in arrival order. A full lane blocks
//!   the producer.
//!
//! # Ownership
//!
//! A hub is an ordinary value shared through `Arc`. Tests and independent
//! subsystems can create their own hubs; code that does not care can use
//! [`DispatchHub::shared`].

mod lane;

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, warn};

use crate::config::DispatchConfig;
use crate::error::ReactorResult;

use lane::Lane;
pub(crate) use lane::Task;

/// The category of a queued callback. Each category has its own lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Read notifications.
    Read,
    /// Write notifications.
    Write,
    /// Concurrent binding propagation.
    Bind,
}

impl QueueKind {
    pub const ALL: [QueueKind; 3] = [QueueKind::Read, QueueKind::Write, QueueKind::Bind];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Read => "read",
            QueueKind::Write => "write",
            QueueKind::Bind => "bind",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner of the dispatch lanes and the async runtime.
pub struct DispatchHub {
    config: DispatchConfig,
    read: Lane,
    write: Lane,
    bind: Lane,
    handle: Handle,
    /// Present when the hub built its own runtime.
    runtime: Option<Runtime>,
}

static SHARED: OnceLock<Arc<DispatchHub>> = OnceLock::new();

impl DispatchHub {
    /// Create a hub with its own multi-threaded runtime for async callbacks.
    pub fn new(config: DispatchConfig) -> ReactorResult<Arc<Self>> {
        config.validate()?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.async_workers)
            .thread_name(format!("{}-async", config.thread_prefix))
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Arc::new(Self::assemble(config, handle, Some(runtime))))
    }

    /// Create a hub that spawns async callbacks onto an existing runtime.
    pub fn with_handle(config: DispatchConfig, handle: Handle) -> ReactorResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self::assemble(config, handle, None)))
    }

    /// The process-wide default hub, built on first use.
    pub fn shared() -> ReactorResult<Arc<Self>> {
        if let Some(hub) = SHARED.get() {
            return Ok(Arc::clone(hub));
        }
        let hub = Self::new(DispatchConfig::default())?;
        Ok(Arc::clone(SHARED.get_or_init(|| hub)))
    }

    fn assemble(config: DispatchConfig, handle: Handle, runtime: Option<Runtime>) -> Self {
        let capacity = config.queue_capacity;
        let prefix = config.thread_prefix.as_str();
        debug!(capacity, owns_runtime = runtime.is_some(), "dispatch hub created");
        Self {
            read: Lane::new(QueueKind::Read, capacity, prefix),
            write: Lane::new(QueueKind::Write, capacity, prefix),
            bind: Lane::new(QueueKind::Bind, capacity, prefix),
            config,
            handle,
            runtime,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    fn lane(&self, kind: QueueKind) -> &Lane {
        match kind {
            QueueKind::Read => &self.read,
            QueueKind::Write => &self.write,
            QueueKind::Bind => &self.bind,
        }
    }

    /// Make sure the lane for `kind` exists and has a consumer.
    pub fn arm(&self, kind: QueueKind) -> ReactorResult<()> {
        self.lane(kind).handle().map(|_| ())
    }

    /// Like [`arm`](Self::arm), but only logs a failure; `enqueue` retries.
    pub(crate) fn arm_or_warn(&self, kind: QueueKind) {
        if let Err(err) = self.arm(kind) {
            warn!(lane = kind.as_str(), %err, "could not arm dispatch lane");
        }
    }

    pub fn is_armed(&self, kind: QueueKind) -> bool {
        self.lane(kind).is_armed()
    }

    /// Items waiting on the lane for `kind`.
    pub fn pending(&self, kind: QueueKind) -> usize {
        self.lane(kind).pending()
    }

    /// Tear the lane for `kind` down.
    ///
    /// Work already accepted is still delivered. The next queued callback or
    /// concurrent registration re-arms the lane with a new consumer.
    pub fn shutdown(&self, kind: QueueKind) -> bool {
        self.lane(kind).shutdown()
    }

    pub fn shutdown_all(&self) {
        for kind in QueueKind::ALL {
            self.shutdown(kind);
        }
    }

    /// Push `task` onto the lane for `kind`, blocking while it is full.
    pub(crate) fn enqueue(&self, kind: QueueKind, task: Task) {
        self.lane(kind).enqueue(task);
    }

    /// Run `task` as an independent task on the runtime's blocking pool.
    pub(crate) fn spawn(&self, task: Task) {
        drop(self.handle.spawn_blocking(task));
    }
}

impl fmt::Debug for DispatchHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchHub")
            .field("config", &self.config)
            .field("read_armed", &self.read.is_armed())
            .field("write_armed", &self.write.is_armed())
            .field("bind_armed", &self.bind.is_armed())
            .field("owns_runtime", &self.runtime.is_some())
            .finish()
    }
}

impl Drop for DispatchHub {
    fn drop(&mut self) {
        self.shutdown_all();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

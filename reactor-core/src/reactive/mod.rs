//! Reactive Variables
//!
//! This module implements the reactive variables and the machinery that
//! connects them: callbacks, bindings, and propagation.
//!
//! # Concepts
//!
//! ## Triggers
//!
//! A [`Trigger`] is a mutable container. Reading it fires its read
//! callbacks; writing it fires its write callbacks and pushes the new value
//! through its outgoing bindings.
//!
//! ## Indicators
//!
//! An [`Indicator`] is a reactive variable whose value may be derived from
//! other variables through bindings. Bindings are immediate, delayed, or
//! concurrent (see [`BindMode`]).
//!
//! ## Callbacks
//!
//! [`ReadCallback`] and [`WriteCallback`] wrap user functions in a small
//! middleware chain. The chain decides whether the function runs inline, on
//! an async task, on a dispatch lane, or only under a predicate.
//!
//! # Implementation Notes
//!
//! Each variable guards its value with its own lock, held only long enough
//! to read or swap the value. Callbacks and bindings run outside the lock.
//! Propagation is returned from a write as a [`Pending`] worklist and drained
//! iteratively. Delayed bindings are resolved the other way round: a read
//! walks its delayed sources upstream on an explicit stack and settles them
//! deepest first. Neither direction grows the call stack with chain length,
//! and since every binding holds at least one end weakly, dropping a long
//! chain does not either.

mod binding;
mod callback;
mod indicator;
mod state;
mod trigger;

pub use binding::{BindMode, Binder, Binding, Pending, Reader, Resolve, Source};
pub use callback::{Callback, Change, ReadCallback, WriteCallback};
pub use indicator::Indicator;
pub use trigger::Trigger;

pub(crate) use state::VarState;

//! Reactor Core
//!
//! This crate provides reactive variables that notify interested parties when
//! they are read or written, and that can be chained so one variable's value
//! is derived from another's.
//!
//! It implements:
//!
//! - Reactive variables ([`Trigger`], [`Indicator`]) with read and write
//!   callbacks
//! - Immediate, delayed and concurrent bindings between variables
//! - Callback dispatch: inline, async, queued per category, conditional
//! - Sequence and map adapters with element-level callbacks
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: reactive variables, callbacks, bindings and propagation
//! - `dispatch`: the dispatch hub and its per-category queues
//! - `graph`: the binding graph used to reject cycles and inspect reach
//! - `adapters`: typed sequence and map variables
//!
//! # Example
//!
//! ```rust
//! use reactor_core::{DispatchConfig, DispatchHub, Indicator, ReadCallback, Trigger};
//!
//! let hub = DispatchHub::new(DispatchConfig::default()).unwrap();
//!
//! let count = Trigger::<i32>::new();
//! let doubled = Indicator::<i32>::new();
//! doubled.add_binding(&count, |n| n * 2).unwrap();
//!
//! // Logged on the read lane, and only for even values.
//! doubled.add_read_callback(
//!     ReadCallback::<i32>::new(|v| println!("doubled: {v:?}"))
//!         .concurrent(&hub)
//!         .conditional(|v| v.is_some_and(|n| n % 2 == 0)),
//! );
//!
//! count.set_value(5);
//! assert_eq!(doubled.value(), Some(10));
//! ```

pub mod adapters;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod graph;
pub mod reactive;

pub use adapters::{Entry, KeyChange, KeyEntry, MapTrigger, SeqEvent, SeqTrigger};
pub use config::DispatchConfig;
pub use dispatch::{DispatchHub, QueueKind};
pub use error::{ReactorError, ReactorResult};
pub use graph::NodeId;
pub use reactive::{
    BindMode, Binder, Binding, Callback, Change, Indicator, Pending, ReadCallback, Reader,
    Resolve, Source, Trigger, WriteCallback,
};

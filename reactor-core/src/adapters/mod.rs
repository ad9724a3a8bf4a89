//! Typed Adapters
//!
//! Reactive variables over collections, with element-level access and
//! element-level callbacks on top of the usual whole-value surface.
//!
//! - [`SeqTrigger`]: a sequence with indexed reads and writes, `append`,
//!   `pop` and `slice`.
//! - [`MapTrigger`]: an insertion-ordered map with keyed reads and writes.
//!
//! Both are binding sources. Only whole-value writes (`set_value`) drive
//! bindings; element-level changes fire element-level callbacks alone, so a
//! dependent that must see them should bind with a delayed binding.
//!
//! Values arriving as untyped JSON are narrowed with `try_set_value`, which
//! fails with [`ReactorError::TypeMismatch`] and leaves the stored value as
//! it was.

mod map;
mod seq;

pub use map::{KeyChange, KeyEntry, MapTrigger};
pub use seq::{Entry, SeqEvent, SeqTrigger};

use serde::de::DeserializeOwned;

use crate::error::{ReactorError, ReactorResult};

/// Narrow a dynamic value to `T`.
pub(crate) fn narrow<T>(value: serde_json::Value, expected: &'static str) -> ReactorResult<T>
where
    T: DeserializeOwned,
{
    serde_json::from_value(value).map_err(|error| ReactorError::TypeMismatch { expected, error })
}

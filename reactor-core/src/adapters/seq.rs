//! Sequence adapter.
//!
//! All indices are 0-based. Values handed out (from `value`, `slice`, or to
//! callbacks) are copies; changing them has no effect on the trigger.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;

use super::narrow;
use crate::dispatch::QueueKind;
use crate::error::{ReactorError, ReactorResult};
use crate::graph::{NodeId, NodeKind};
use crate::reactive::{
    Binding, Callback, ReadCallback, Reader, Source, VarState, WriteCallback,
};

/// An element read through [`SeqTrigger::at`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<T> {
    pub index: usize,
    pub value: T,
}

/// An element-level change to a [`SeqTrigger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeqEvent<T> {
    /// `set_at` replaced `previous` with `current` at `index`.
    Set { index: usize, previous: T, current: T },
    /// `append` added `value`, which now sits at `index`.
    Appended { index: usize, value: T },
    /// `pop` removed `value` from `index`.
    Popped { index: usize, value: T },
}

impl<T> SeqEvent<T> {
    pub fn index(&self) -> usize {
        match self {
            SeqEvent::Set { index, .. }
            | SeqEvent::Appended { index, .. }
            | SeqEvent::Popped { index, .. } => *index,
        }
    }
}

struct SeqInner<T> {
    state: VarState<Vec<T>>,
    index_reads: RwLock<Vec<Callback<Entry<T>>>>,
    index_writes: RwLock<Vec<Callback<SeqEvent<T>>>>,
}

/// A reactive sequence of `T`.
///
/// ```rust
/// use reactor_core::SeqTrigger;
///
/// let seq = SeqTrigger::new();
/// seq.append(1);
/// seq.append(2);
/// assert_eq!(seq.at(1).unwrap(), 2);
/// assert!(seq.at(2).unwrap_err().is_bounds());
/// assert_eq!(seq.pop().unwrap(), 2);
/// assert_eq!(seq.value(), vec![1]);
/// ```
pub struct SeqTrigger<T> {
    inner: Arc<SeqInner<T>>,
}

fn items<T>(slot: &mut Option<Vec<T>>) -> &mut Vec<T> {
    slot.get_or_insert_with(Vec::new)
}

impl<T> SeqTrigger<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty sequence.
    pub fn new() -> Self {
        let state = VarState::new(NodeKind::Sequence);
        state.with_value_mut(|slot| *slot = Some(Vec::new()));
        Self {
            inner: Arc::new(SeqInner {
                state,
                index_reads: RwLock::new(Vec::new()),
                index_writes: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.state.id()
    }

    /// A copy of the whole sequence. Fires read callbacks.
    pub fn value(&self) -> Vec<T> {
        self.inner.state.read().unwrap_or_default()
    }

    /// Replace the whole sequence. Fires write callbacks and drives bindings.
    pub fn set_value(&self, items: Vec<T>) {
        self.inner.state.assign(items).run();
    }

    pub fn len(&self) -> usize {
        self.inner.state.with_value_mut(|slot| slot.as_ref().map_or(0, Vec::len))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `index`. Fires index read callbacks.
    pub fn at(&self, index: usize) -> ReactorResult<T> {
        let value = self.inner.state.with_value_mut(|slot| {
            let items = items(slot);
            items.get(index).cloned().ok_or(ReactorError::OutOfBounds {
                index,
                len: items.len(),
            })
        })?;

        self.notify_index_read(&Entry {
            index,
            value: value.clone(),
        });
        Ok(value)
    }

    /// Replace the element at `index`. Fires index write callbacks.
    pub fn set_at(&self, index: usize, value: T) -> ReactorResult<()> {
        let previous = self.inner.state.with_value_mut(|slot| {
            let items = items(slot);
            let len = items.len();
            items
                .get_mut(index)
                .map(|item| std::mem::replace(item, value.clone()))
                .ok_or(ReactorError::OutOfBounds { index, len })
        })?;

        self.notify_index_write(&SeqEvent::Set {
            index,
            previous,
            current: value,
        });
        Ok(())
    }

    /// Add `value` at the end. Fires index write callbacks.
    pub fn append(&self, value: T) {
        let index = self.inner.state.with_value_mut(|slot| {
            let items = items(slot);
            items.push(value.clone());
            items.len() - 1
        });

        self.notify_index_write(&SeqEvent::Appended { index, value });
    }

    /// Remove and return the last element. Fires index write callbacks.
    pub fn pop(&self) -> ReactorResult<T> {
        let (index, value) = self.inner.state.with_value_mut(|slot| {
            let items = items(slot);
            let value = items.pop().ok_or(ReactorError::Empty)?;
            Ok::<_, ReactorError>((items.len(), value))
        })?;

        self.notify_index_write(&SeqEvent::Popped {
            index,
            value: value.clone(),
        });
        Ok(value)
    }

    /// A copy of `[from, to)`. Fires whole-value read callbacks with the copy.
    pub fn slice(&self, from: usize, to: usize) -> ReactorResult<Vec<T>> {
        let part = self.inner.state.with_value_mut(|slot| {
            let items = items(slot);
            let len = items.len();
            if from > to || to > len {
                return Err(ReactorError::InvalidRange { from, to, len });
            }
            Ok(items[from..to].to_vec())
        })?;

        self.inner.state.notify_read(&Some(part.clone()));
        Ok(part)
    }

    pub fn add_read_callback(&self, callback: ReadCallback<Vec<T>>) {
        self.inner.state.add_read(callback);
    }

    pub fn add_write_callback(&self, callback: WriteCallback<Vec<T>>) {
        self.inner.state.add_write(callback);
    }

    pub fn on_read<F>(&self, f: F)
    where
        F: Fn(Option<&Vec<T>>) + Send + Sync + 'static,
    {
        self.add_read_callback(ReadCallback::new(f));
    }

    pub fn on_write<F>(&self, f: F)
    where
        F: Fn(Option<&Vec<T>>, &Vec<T>) + Send + Sync + 'static,
    {
        self.add_write_callback(WriteCallback::new(f));
    }

    pub fn add_index_read_callback(&self, callback: Callback<Entry<T>>) {
        self.inner.index_reads.write().push(callback);
    }

    pub fn add_index_write_callback(&self, callback: Callback<SeqEvent<T>>) {
        self.inner.index_writes.write().push(callback);
    }

    pub fn on_index_read<F>(&self, f: F)
    where
        F: Fn(&Entry<T>) + Send + Sync + 'static,
    {
        self.add_index_read_callback(Callback::from_fn(QueueKind::Read, f));
    }

    pub fn on_index_write<F>(&self, f: F)
    where
        F: Fn(&SeqEvent<T>) + Send + Sync + 'static,
    {
        self.add_index_write_callback(Callback::from_fn(QueueKind::Write, f));
    }

    pub fn binding_count(&self) -> usize {
        self.inner.state.binding_count()
    }

    fn notify_index_read(&self, entry: &Entry<T>) {
        let callbacks = self.inner.index_reads.read().clone();
        for callback in &callbacks {
            callback.invoke(entry);
        }
    }

    fn notify_index_write(&self, event: &SeqEvent<T>) {
        let callbacks = self.inner.index_writes.read().clone();
        for callback in &callbacks {
            callback.invoke(event);
        }
    }
}

impl<T> SeqTrigger<T>
where
    T: Clone + Send + Sync + DeserializeOwned + 'static,
{
    /// Narrow `value` to a sequence of `T` and store it.
    ///
    /// On failure nothing is stored and no callback fires.
    pub fn try_set_value(&self, value: serde_json::Value) -> ReactorResult<()> {
        let items = narrow::<Vec<T>>(value, "sequence")?;
        self.set_value(items);
        Ok(())
    }
}

impl<T> Default for SeqTrigger<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SeqTrigger<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Source<Vec<T>> for SeqTrigger<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn value(&self) -> Option<Vec<T>> {
        Some(SeqTrigger::value(self))
    }

    fn add_binder(&self, binding: Binding<Vec<T>>) {
        self.inner.state.add_binding(binding);
    }

    fn reader(&self) -> Reader<Vec<T>> {
        let inner = Arc::downgrade(&self.inner);
        Box::new(move || inner.upgrade().map(|inner| inner.state.read().unwrap_or_default()))
    }
}

impl<T> fmt::Debug for SeqTrigger<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeqTrigger")
            .field("id", &self.id())
            .field("items", &self.inner.state.peek())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Indicator;
    use parking_lot::Mutex;
    use serde_json::json;

    fn seq_of(items: &[i32]) -> SeqTrigger<i32> {
        let seq = SeqTrigger::new();
        seq.set_value(items.to_vec());
        seq
    }

    #[test]
    fn starts_empty() {
        let seq = SeqTrigger::<i32>::new();
        assert!(seq.is_empty());
        assert_eq!(seq.value(), Vec::<i32>::new());
        assert!(matches!(seq.pop(), Err(ReactorError::Empty)));
    }

    #[test]
    fn out_of_bounds_leaves_sequence_alone() {
        let seq = seq_of(&[1, 2, 3]);

        let err = seq.at(3).unwrap_err();
        assert!(err.is_bounds());
        assert!(matches!(err, ReactorError::OutOfBounds { index: 3, len: 3 }));

        assert!(seq.set_at(10, 0).unwrap_err().is_bounds());
        assert_eq!(seq.value(), vec![1, 2, 3]);
    }

    #[test]
    fn set_at_replaces_in_place() {
        let seq = seq_of(&[1, 2, 3]);
        seq.set_at(1, 20).unwrap();
        assert_eq!(seq.value(), vec![1, 20, 3]);
        assert_eq!(seq.at(1).unwrap(), 20);
    }

    #[test]
    fn append_then_pop_restores() {
        let seq = seq_of(&[4, 5]);
        seq.append(6);
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.pop().unwrap(), 6);
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.at(1).unwrap(), 5);
    }

    #[test]
    fn slice_checks_range() {
        let seq = seq_of(&[0, 1, 2, 3, 4]);
        assert_eq!(seq.slice(1, 3).unwrap(), vec![1, 2]);
        assert_eq!(seq.slice(5, 5).unwrap(), Vec::<i32>::new());
        assert!(matches!(
            seq.slice(3, 2),
            Err(ReactorError::InvalidRange { from: 3, to: 2, len: 5 })
        ));
        assert!(seq.slice(0, 6).unwrap_err().is_bounds());
    }

    #[test]
    fn slice_fires_read_callbacks_with_the_part() {
        let seq = seq_of(&[0, 1, 2, 3]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        seq.on_read(move |v| seen_clone.lock().push(v.cloned()));

        seq.slice(2, 4).unwrap();
        assert_eq!(*seen.lock(), vec![Some(vec![2, 3])]);
    }

    #[test]
    fn index_callbacks_describe_each_event() {
        let seq = seq_of(&[7]);
        let reads = Arc::new(Mutex::new(Vec::new()));
        let writes = Arc::new(Mutex::new(Vec::new()));
        let reads_clone = reads.clone();
        let writes_clone = writes.clone();
        seq.on_index_read(move |entry| reads_clone.lock().push(entry.clone()));
        seq.on_index_write(move |event| writes_clone.lock().push(event.clone()));

        seq.at(0).unwrap();
        seq.set_at(0, 8).unwrap();
        seq.append(9);
        seq.pop().unwrap();

        assert_eq!(*reads.lock(), vec![Entry { index: 0, value: 7 }]);
        assert_eq!(
            *writes.lock(),
            vec![
                SeqEvent::Set { index: 0, previous: 7, current: 8 },
                SeqEvent::Appended { index: 1, value: 9 },
                SeqEvent::Popped { index: 1, value: 9 },
            ]
        );
        assert_eq!(writes.lock()[1].index(), 1);
    }

    #[test]
    fn try_set_value_narrows() {
        let seq = seq_of(&[1]);
        seq.try_set_value(json!([3, 4])).unwrap();
        assert_eq!(seq.value(), vec![3, 4]);

        let err = seq.try_set_value(json!("not a list")).unwrap_err();
        assert!(matches!(err, ReactorError::TypeMismatch { .. }));
        assert_eq!(seq.value(), vec![3, 4]);
    }

    #[test]
    fn only_whole_writes_drive_bindings() {
        let seq = SeqTrigger::<i32>::new();
        let total = Indicator::<i32>::new();
        total.add_binding(&seq, |items: &Vec<i32>| items.iter().sum()).unwrap();

        seq.set_value(vec![1, 2, 3]);
        assert_eq!(total.peek(), Some(6));

        seq.append(10);
        assert_eq!(total.peek(), Some(6));
        assert_eq!(seq.binding_count(), 1);
    }
}

//! Map adapter.
//!
//! Keys keep insertion order, so `keys()` and `values()` are deterministic.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;

use super::narrow;
use crate::dispatch::QueueKind;
use crate::error::ReactorResult;
use crate::graph::{NodeId, NodeKind};
use crate::reactive::{
    Binding, Callback, ReadCallback, Reader, Source, VarState, WriteCallback,
};

/// A key read through [`MapTrigger::get`]. `value` is `None` for a missing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry<K, V> {
    pub key: K,
    pub value: Option<V>,
}

/// A key-level change. `current` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChange<K, V> {
    pub key: K,
    pub previous: Option<V>,
    pub current: Option<V>,
}

struct MapInner<K, V> {
    state: VarState<IndexMap<K, V>>,
    key_reads: RwLock<Vec<Callback<KeyEntry<K, V>>>>,
    key_writes: RwLock<Vec<Callback<KeyChange<K, V>>>>,
}

/// A reactive map from `K` to `V`.
pub struct MapTrigger<K, V> {
    inner: Arc<MapInner<K, V>>,
}

fn entries<K, V>(slot: &mut Option<IndexMap<K, V>>) -> &mut IndexMap<K, V> {
    slot.get_or_insert_with(IndexMap::new)
}

impl<K, V> MapTrigger<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let state = VarState::new(NodeKind::Map);
        state.with_value_mut(|slot| *slot = Some(IndexMap::new()));
        Self {
            inner: Arc::new(MapInner {
                state,
                key_reads: RwLock::new(Vec::new()),
                key_writes: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.state.id()
    }

    /// A copy of the whole map. Fires read callbacks.
    pub fn value(&self) -> IndexMap<K, V> {
        self.inner.state.read().unwrap_or_default()
    }

    /// Replace the whole map. Fires write callbacks and drives bindings.
    pub fn set_value(&self, entries: IndexMap<K, V>) {
        self.inner.state.assign(entries).run();
    }

    /// The value under `key`. Fires key read callbacks, also for a missing key.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self
            .inner
            .state
            .with_value_mut(|slot| entries(slot).get(key).cloned());

        self.notify_key_read(&KeyEntry {
            key: key.clone(),
            value: value.clone(),
        });
        value
    }

    /// Whether `key` is present. Fires nothing.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner
            .state
            .with_value_mut(|slot| entries(slot).contains_key(key))
    }

    /// Store `value` under `key`, returning what was there. Fires key write
    /// callbacks.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        let previous = self
            .inner
            .state
            .with_value_mut(|slot| entries(slot).insert(key.clone(), value.clone()));

        self.notify_key_write(&KeyChange {
            key,
            previous: previous.clone(),
            current: Some(value),
        });
        previous
    }

    /// Remove `key`, returning its value. Fires key write callbacks even if
    /// the key was absent.
    pub fn remove(&self, key: &K) -> Option<V> {
        let previous = self
            .inner
            .state
            .with_value_mut(|slot| entries(slot).shift_remove(key));

        self.notify_key_write(&KeyChange {
            key: key.clone(),
            previous: previous.clone(),
            current: None,
        });
        previous
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner
            .state
            .with_value_mut(|slot| entries(slot).keys().cloned().collect())
    }

    pub fn values(&self) -> Vec<V> {
        self.inner
            .state
            .with_value_mut(|slot| entries(slot).values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.inner
            .state
            .with_value_mut(|slot| slot.as_ref().map_or(0, IndexMap::len))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_read_callback(&self, callback: ReadCallback<IndexMap<K, V>>) {
        self.inner.state.add_read(callback);
    }

    pub fn add_write_callback(&self, callback: WriteCallback<IndexMap<K, V>>) {
        self.inner.state.add_write(callback);
    }

    pub fn on_read<F>(&self, f: F)
    where
        F: Fn(Option<&IndexMap<K, V>>) + Send + Sync + 'static,
    {
        self.add_read_callback(ReadCallback::new(f));
    }

    pub fn on_write<F>(&self, f: F)
    where
        F: Fn(Option<&IndexMap<K, V>>, &IndexMap<K, V>) + Send + Sync + 'static,
    {
        self.add_write_callback(WriteCallback::new(f));
    }

    pub fn add_key_read_callback(&self, callback: Callback<KeyEntry<K, V>>) {
        self.inner.key_reads.write().push(callback);
    }

    pub fn add_key_write_callback(&self, callback: Callback<KeyChange<K, V>>) {
        self.inner.key_writes.write().push(callback);
    }

    pub fn on_key_read<F>(&self, f: F)
    where
        F: Fn(&KeyEntry<K, V>) + Send + Sync + 'static,
    {
        self.add_key_read_callback(Callback::from_fn(QueueKind::Read, f));
    }

    pub fn on_key_write<F>(&self, f: F)
    where
        F: Fn(&KeyChange<K, V>) + Send + Sync + 'static,
    {
        self.add_key_write_callback(Callback::from_fn(QueueKind::Write, f));
    }

    pub fn binding_count(&self) -> usize {
        self.inner.state.binding_count()
    }

    fn notify_key_read(&self, entry: &KeyEntry<K, V>) {
        let callbacks = self.inner.key_reads.read().clone();
        for callback in &callbacks {
            callback.invoke(entry);
        }
    }

    fn notify_key_write(&self, change: &KeyChange<K, V>) {
        let callbacks = self.inner.key_writes.read().clone();
        for callback in &callbacks {
            callback.invoke(change);
        }
    }
}

impl<K, V> MapTrigger<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + DeserializeOwned + 'static,
    V: Clone + Send + Sync + DeserializeOwned + 'static,
{
    /// Narrow `value` to a map and store it. On failure nothing is stored.
    pub fn try_set_value(&self, value: serde_json::Value) -> ReactorResult<()> {
        let entries = narrow::<IndexMap<K, V>>(value, "map")?;
        self.set_value(entries);
        Ok(())
    }
}

impl<K, V> Default for MapTrigger<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for MapTrigger<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Source<IndexMap<K, V>> for MapTrigger<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn value(&self) -> Option<IndexMap<K, V>> {
        Some(MapTrigger::value(self))
    }

    fn add_binder(&self, binding: Binding<IndexMap<K, V>>) {
        self.inner.state.add_binding(binding);
    }

    fn reader(&self) -> Reader<IndexMap<K, V>> {
        let inner = Arc::downgrade(&self.inner);
        Box::new(move || inner.upgrade().map(|inner| inner.state.read().unwrap_or_default()))
    }
}

impl<K, V> fmt::Debug for MapTrigger<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + fmt::Debug + 'static,
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapTrigger")
            .field("id", &self.id())
            .field("entries", &self.inner.state.peek())
            .finish()
    }
}

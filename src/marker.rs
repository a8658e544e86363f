use crate::block::BlockKey;
use crate::clock::Timestamp;
use fxhash::FxHashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Begin time of a marker.
///
/// Shared between the store entry and the thread that opened it, so the clock can be read
/// after the store lock is released.
#[derive(Debug, Clone, Default)]
pub(crate) struct BeginCell(Arc<AtomicU64>);

impl BeginCell {
    #[inline(always)]
    pub(crate) fn stamp(&self, at: Timestamp) {
        self.0.store(at.as_nanos(), Ordering::Release);
    }

    #[inline(always)]
    pub(crate) fn get(&self) -> Timestamp {
        Timestamp::from_nanos(self.0.load(Ordering::Acquire))
    }
}

pub(crate) trait Marker: Default + Send {
    fn begin(&self) -> &BeginCell;
}

/// One open timestamp, consumed by the matching end.
#[derive(Debug, Default)]
pub(crate) struct InstantMarker {
    begin: BeginCell,
}

impl Marker for InstantMarker {
    fn begin(&self) -> &BeginCell {
        &self.begin
    }
}

/// Open timestamp plus the exponentially smoothed duration of past runs.
#[derive(Debug, Default)]
pub(crate) struct SmoothMarker {
    begin: BeginCell,
    pub(crate) last_slice: f64,
}

impl SmoothMarker {
    /// `factor * last_slice + (1 - factor) * elapsed`, stored and returned.
    pub(crate) fn update(&mut self, elapsed_ms: f64, factor: f64) -> f64 {
        self.last_slice = factor * self.last_slice + (1.0 - factor) * elapsed_ms;
        self.last_slice
    }
}

impl Marker for SmoothMarker {
    fn begin(&self) -> &BeginCell {
        &self.begin
    }
}

/// Open timestamp plus running total and sample count.
#[derive(Debug, Default)]
pub(crate) struct AggregateMarker {
    begin: BeginCell,
    pub(crate) total_ms: f64,
    pub(crate) num_samples: u64,
}

impl AggregateMarker {
    pub(crate) fn record(&mut self, elapsed_ms: f64) {
        self.num_samples += 1;
        self.total_ms += elapsed_ms;
    }
}

impl Marker for AggregateMarker {
    fn begin(&self) -> &BeginCell {
        &self.begin
    }
}

/// A map of markers behind its own lock.
///
/// The lock is only ever held for a lookup, insert or swap; no clock read and no logging
/// happens under it.
#[derive(Debug)]
pub(crate) struct MarkerStore<M> {
    markers: Mutex<FxHashMap<BlockKey, M>>,
}

impl<M: Marker> MarkerStore<M> {
    pub(crate) fn new() -> Self {
        Self {
            markers: Mutex::new(FxHashMap::default()),
        }
    }

    /// Returns the begin cell for `key`, creating the marker if the key is not open yet.
    /// An existing marker is reused, so a second open resets it.
    ///
    /// The fresh marker is built before the lock is taken; when the key is already open it
    /// is dropped after the lock is released.
    #[inline]
    pub(crate) fn open(&self, key: BlockKey) -> BeginCell {
        let fresh = M::default();
        let mut markers = self.lock();
        let (begin, spare) = match markers.entry(key) {
            Entry::Occupied(entry) => (entry.get().begin().clone(), Some(fresh)),
            Entry::Vacant(entry) => (entry.insert(fresh).begin().clone(), None),
        };
        drop(markers);
        drop(spare);
        begin
    }

    /// Runs `f` on the marker for `key`, if any.
    #[inline]
    pub(crate) fn with_marker<R>(&self, key: &BlockKey, f: impl FnOnce(&mut M) -> R) -> Option<R> {
        self.lock().get_mut(key).map(f)
    }

    #[inline]
    pub(crate) fn take(&self, key: &BlockKey) -> Option<M> {
        self.lock().remove(key)
    }

    pub(crate) fn snapshot<T>(&self, mut f: impl FnMut(&BlockKey, &M) -> T) -> Vec<T> {
        self.lock().iter().map(|(key, marker)| f(key, marker)).collect()
    }

    /// Drops every marker and returns how many there were.
    ///
    /// The map is swapped out under the lock and freed after it is released.
    pub(crate) fn clear(&self) -> usize {
        let old = std::mem::take(&mut *self.lock());
        old.len()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<BlockKey, M>> {
        self.markers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

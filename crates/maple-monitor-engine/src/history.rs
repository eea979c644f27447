//! Bounded per-entity history.
//!
//! Provides:
//! - **HistoryWindow**: bounded FIFO ring buffer
//! - **EntityState**: everything the engine keeps for one entity
//! - **HistoryStore**: entity-sharded map of per-entity locked state

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::anomaly::AnomalyResult;
use crate::error::MonitorResult;
use crate::features::{FeatureContext, FeatureExtractor, FeatureVector};
use crate::fingerprint::Fingerprint;
use crate::leak::LeakReport;
use crate::sample::{EntityId, Sample};

// ── History Window ──────────────────────────────────────────────────────

/// A bounded circular buffer.
///
/// When full, the oldest item is evicted. Insertion order is the only order.
#[derive(Clone, Debug)]
pub struct HistoryWindow<T> {
    buffer: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T: Clone> HistoryWindow<T> {
    /// Create a window with the given capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(1);
        Self {
            buffer: vec![None; cap],
            head: 0,
            len: 0,
        }
    }

    /// Push an item, evicting the oldest if full.
    pub fn push(&mut self, item: T) {
        self.buffer[self.head] = Some(item);
        self.head = (self.head + 1) % self.buffer.len();
        if self.len < self.buffer.len() {
            self.len += 1;
        }
    }

    /// Iterate oldest first.
    pub fn iter(&self) -> HistoryIter<'_, T> {
        let start = if self.len < self.buffer.len() {
            0
        } else {
            self.head
        };
        HistoryIter {
            buffer: &self.buffer,
            pos: start,
            remaining: self.len,
        }
    }

    /// Most recently pushed item.
    pub fn latest(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.head + self.buffer.len() - 1) % self.buffer.len();
        self.buffer[idx].as_ref()
    }

    /// Owned copy in insertion order.
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

}

/// Iterator over a `HistoryWindow`.
pub struct HistoryIter<'a, T> {
    buffer: &'a [Option<T>],
    pos: usize,
    remaining: usize,
}

impl<'a, T> Iterator for HistoryIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.buffer[self.pos].as_ref();
        self.pos = (self.pos + 1) % self.buffer.len();
        self.remaining -= 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

// ── Entity State ────────────────────────────────────────────────────────

/// Everything retained for one entity.
///
/// `samples` and `features` are pushed together and always have equal length.
#[derive(Clone, Debug)]
pub struct EntityState {
    pub entity: EntityId,
    pub samples: HistoryWindow<Sample>,
    pub features: HistoryWindow<FeatureVector>,
    pub fingerprint: Option<Fingerprint>,
    pub last_result: Option<AnomalyResult>,
    pub last_leak: Option<LeakReport>,
    /// Total appends since the entity was created.
    pub appends: u64,
    pub last_seen: DateTime<Utc>,
    pub name: Option<String>,
    touched: u64,
    /// Set when the slot is dropped from the store; appends must not land here.
    retired: bool,
}

impl EntityState {
    fn new(entity: EntityId, capacity: usize) -> Self {
        Self {
            entity,
            samples: HistoryWindow::new(capacity),
            features: HistoryWindow::new(capacity),
            fingerprint: None,
            last_result: None,
            last_leak: None,
            appends: 0,
            last_seen: Utc::now(),
            name: None,
            touched: 0,
            retired: false,
        }
    }

    fn push(&mut self, sample: Sample, features: FeatureVector, touched: u64) {
        self.last_seen = sample.timestamp;
        if sample.name.is_some() {
            self.name = sample.name.clone();
        }
        self.samples.push(sample);
        self.features.push(features);
        self.appends += 1;
        self.touched = touched;
    }

    /// Window length (samples and features are always equal).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ── History Store ───────────────────────────────────────────────────────

/// Concurrent per-entity history.
///
/// Each entity has its own mutex; the map shard lock is only held while the
/// slot is looked up or inserted, never during analysis.
#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    entities: DashMap<EntityId, Arc<Mutex<EntityState>>>,
    clock: AtomicU64,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entities: DashMap::new(),
            clock: AtomicU64::new(0),
        }
    }

    /// Validate and append a sample with its feature vector.
    ///
    /// Returns the window length after the append.
    pub fn append(&self, sample: Sample, context: &FeatureContext) -> MonitorResult<usize> {
        self.append_with(sample, context, |state| state.len())
    }

    /// Append, then run `f` on the entity state while still holding its lock.
    ///
    /// An invalid sample is rejected before the entity slot is created.
    pub fn append_with<R, F>(
        &self,
        sample: Sample,
        context: &FeatureContext,
        f: F,
    ) -> MonitorResult<R>
    where
        F: FnOnce(&mut EntityState) -> R,
    {
        if let Err(e) = sample.validate() {
            warn!(entity = %sample.entity, error = %e, "sample rejected");
            return Err(e);
        }

        let features = FeatureExtractor::extract(&sample, context);
        loop {
            let slot = self.slot(&sample.entity);
            let mut state = slot.lock();
            if state.retired {
                // Removed between lookup and lock; look the entity up again.
                continue;
            }
            let touched = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
            state.push(sample, features, touched);
            return Ok(f(&mut state));
        }
    }

    fn slot(&self, entity: &EntityId) -> Arc<Mutex<EntityState>> {
        if let Some(existing) = self.entities.get(entity) {
            return Arc::clone(existing.value());
        }
        let capacity = self.capacity;
        let slot = self.entities.entry(entity.clone()).or_insert_with(|| {
            debug!(entity = %entity, capacity, "entity created");
            Arc::new(Mutex::new(EntityState::new(entity.clone(), capacity)))
        });
        Arc::clone(slot.value())
    }

    /// Run `f` on a consistent view of one entity's state.
    pub fn with_entity<R, F>(&self, entity: &EntityId, f: F) -> Option<R>
    where
        F: FnOnce(&EntityState) -> R,
    {
        let slot = self.entities.get(entity).map(|s| Arc::clone(s.value()))?;
        let state = slot.lock();
        Some(f(&state))
    }

    /// Run `f` with mutable access to one entity's state.
    pub fn with_entity_mut<R, F>(&self, entity: &EntityId, f: F) -> Option<R>
    where
        F: FnOnce(&mut EntityState) -> R,
    {
        let slot = self.entities.get(entity).map(|s| Arc::clone(s.value()))?;
        let mut state = slot.lock();
        Some(f(&mut state))
    }

    /// Ordered sample window (empty for an unknown entity).
    pub fn window(&self, entity: &EntityId) -> Vec<Sample> {
        self.with_entity(entity, |s| s.samples.to_vec())
            .unwrap_or_default()
    }

    /// Ordered feature vectors (empty for an unknown entity).
    pub fn features(&self, entity: &EntityId) -> Vec<FeatureVector> {
        self.with_entity(entity, |s| s.features.to_vec())
            .unwrap_or_default()
    }

    /// Drop an entity and all its state. Returns whether it existed.
    pub fn remove(&self, entity: &EntityId) -> bool {
        let removed = self
            .entities
            .remove_if(entity, |_, slot| {
                slot.lock().retired = true;
                true
            })
            .is_some();
        if removed {
            debug!(entity = %entity, "entity removed");
        }
        removed
    }

    /// Evict the least recently appended entities until at most
    /// `max_entities` remain. Returns the evicted ids, oldest first.
    ///
    /// An entity appended to after the recency scan is kept, so under
    /// concurrent appends fewer entities than requested may be evicted.
    pub fn evict_least_recent(&self, max_entities: usize) -> Vec<EntityId> {
        if self.entities.len() <= max_entities {
            return Vec::new();
        }

        let slots: Vec<(EntityId, Arc<Mutex<EntityState>>)> = self
            .entities
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        let mut ages: Vec<(u64, EntityId)> = slots
            .into_iter()
            .map(|(id, slot)| (slot.lock().touched, id))
            .collect();
        ages.sort();

        let excess = ages.len().saturating_sub(max_entities);
        let mut evicted = Vec::with_capacity(excess);
        for (touched, id) in ages.into_iter().take(excess) {
            let removed = self.entities.remove_if(&id, |_, slot| {
                let mut state = slot.lock();
                if state.touched != touched {
                    return false;
                }
                state.retired = true;
                true
            });
            if removed.is_some() {
                debug!(entity = %id, "entity evicted");
                evicted.push(id);
            }
        }
        evicted
    }

    /// Known entities, sorted.
    pub fn entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entities.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of known entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::sample::ResourceMetrics;
    use proptest::prelude::*;

    fn sample(entity: EntityId, percent: f64) -> Sample {
        Sample::now(
            entity,
            ResourceMetrics {
                resident_bytes: 1000.0,
                memory_percent: percent,
                ..ResourceMetrics::default()
            },
        )
    }

    // ── HistoryWindow tests ─────────────────────────────────────────

    #[test]
    fn window_basic() {
        let mut w: HistoryWindow<i32> = HistoryWindow::new(4);
        assert!(w.is_empty());
        assert!(w.latest().is_none());

        w.push(1);
        w.push(2);
        w.push(3);

        assert_eq!(w.len(), 3);
        assert_eq!(w.to_vec(), vec![1, 2, 3]);
        assert_eq!(w.latest(), Some(&3));
    }

    #[test]
    fn window_evicts_oldest() {
        let mut w: HistoryWindow<i32> = HistoryWindow::new(3);
        for i in 1..=4 {
            w.push(i);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.to_vec(), vec![2, 3, 4]);
        assert_eq!(w.latest(), Some(&4));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut w: HistoryWindow<i32> = HistoryWindow::new(0);
        w.push(1);
        w.push(2);
        assert_eq!(w.to_vec(), vec![2]);
    }

    proptest! {
        #[test]
        fn window_keeps_last_capacity_items(
            capacity in 1usize..20,
            items in proptest::collection::vec(any::<i32>(), 0..60),
        ) {
            let mut w = HistoryWindow::new(capacity);
            for item in &items {
                w.push(*item);
            }
            let keep = items.len().min(capacity);
            prop_assert_eq!(w.len(), keep);
            prop_assert_eq!(w.to_vec(), items[items.len() - keep..].to_vec());
        }
    }

    // ── HistoryStore tests ──────────────────────────────────────────

    #[test]
    fn store_append_and_read() {
        let store = HistoryStore::new(10);
        let ctx = FeatureContext::default();
        for i in 0..3 {
            let len = store.append(sample(EntityId::System, i as f64), &ctx).unwrap();
            assert_eq!(len, i + 1);
        }
        let window = store.window(&EntityId::System);
        assert_eq!(window.len(), 3);
        assert_eq!(window[2].metrics.memory_percent, 2.0);
        assert_eq!(store.features(&EntityId::System).len(), 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn store_respects_capacity() {
        let store = HistoryStore::new(100);
        let ctx = FeatureContext::default();
        for i in 0..101 {
            store.append(sample(EntityId::Process(1), i as f64), &ctx).unwrap();
        }
        let window = store.window(&EntityId::Process(1));
        assert_eq!(window.len(), 100);
        assert_eq!(window[0].metrics.memory_percent, 1.0);
        assert_eq!(window[99].metrics.memory_percent, 100.0);
    }

    #[test]
    fn invalid_sample_leaves_store_untouched() {
        let store = HistoryStore::new(10);
        let ctx = FeatureContext::default();
        store.append(sample(EntityId::System, 5.0), &ctx).unwrap();

        let bad = sample(EntityId::System, -1.0);
        assert!(matches!(
            store.append(bad, &ctx),
            Err(MonitorError::InvalidSample { .. })
        ));
        assert_eq!(store.window(&EntityId::System).len(), 1);

        // A rejected first sample must not create the entity.
        let bad = sample(EntityId::Process(3), f64::NAN);
        assert!(store.append(bad, &ctx).is_err());
        assert!(store.with_entity(&EntityId::Process(3), |_| ()).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_entity_reads_empty() {
        let store = HistoryStore::new(10);
        assert!(store.window(&EntityId::Process(99)).is_empty());
        assert!(store.features(&EntityId::Process(99)).is_empty());
        assert!(!store.remove(&EntityId::Process(99)));
    }

    #[test]
    fn evict_keeps_most_recent() {
        let store = HistoryStore::new(10);
        let ctx = FeatureContext::default();
        for pid in 1..=4 {
            store.append(sample(EntityId::Process(pid), 1.0), &ctx).unwrap();
        }
        // Touch pid 1 again so it becomes the most recent.
        store.append(sample(EntityId::Process(1), 2.0), &ctx).unwrap();

        let evicted = store.evict_least_recent(2);
        assert_eq!(evicted, vec![EntityId::Process(2), EntityId::Process(3)]);
        assert_eq!(
            store.entities(),
            vec![EntityId::Process(1), EntityId::Process(4)]
        );
        assert!(store.evict_least_recent(5).is_empty());
    }

    #[test]
    fn eviction_never_drops_an_acknowledged_append() {
        let ctx = FeatureContext::default();
        for _ in 0..300 {
            let store = Arc::new(HistoryStore::new(10));
            store.append(sample(EntityId::Process(1), 1.0), &ctx).unwrap();
            store.append(sample(EntityId::Process(2), 1.0), &ctx).unwrap();

            let appender = {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .append(sample(EntityId::Process(1), 77.0), &FeatureContext::default())
                        .is_ok()
                })
            };
            let evictor = {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.evict_least_recent(1))
            };
            assert!(appender.join().unwrap());
            evictor.join().unwrap();

            let window = store.window(&EntityId::Process(1));
            assert_eq!(
                window.last().map(|s| s.metrics.memory_percent),
                Some(77.0)
            );
        }
    }

    #[test]
    fn removed_entity_starts_fresh() {
        let store = HistoryStore::new(10);
        let ctx = FeatureContext::default();
        store.append(sample(EntityId::System, 1.0), &ctx).unwrap();
        store.append(sample(EntityId::System, 2.0), &ctx).unwrap();
        assert!(store.remove(&EntityId::System));
        assert_eq!(store.append(sample(EntityId::System, 3.0), &ctx).unwrap(), 1);
    }

    #[test]
    fn concurrent_appends_to_distinct_entities() {
        let store = Arc::new(HistoryStore::new(50));
        let handles: Vec<_> = (0..4u32)
            .map(|pid| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let ctx = FeatureContext::default();
                    for i in 0..25 {
                        store
                            .append(sample(EntityId::Process(pid), i as f64), &ctx)
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.len(), 4);
        for pid in 0..4u32 {
            let window = store.window(&EntityId::Process(pid));
            assert_eq!(window.len(), 25);
            let order: Vec<f64> = window.iter().map(|s| s.metrics.memory_percent).collect();
            let expected: Vec<f64> = (0..25).map(|i| i as f64).collect();
            assert_eq!(order, expected);
        }
    }
}

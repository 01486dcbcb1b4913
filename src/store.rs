//! Concurrent key -> [`Measurement`] table.
//!
//! Keys hash onto a power-of-two set of shards, each a mutex over its own map.
//! Every creation or fold for a key happens under that key's shard lock, which
//! makes per-key updates linearizable while keys on different shards never
//! contend. A key's first creation registers it with the [`KeyRegistry`]
//! before the shard lock is released.

use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::{FxBuildHasher, FxHashMap};
use tracing::error;

use crate::error::{Error, Result};
use crate::registry::KeyRegistry;

/// Running aggregate for one key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u64,
}

impl Measurement {
    pub fn new(value: f64) -> Self {
        Self {
            min: value,
            max: value,
            sum: value,
            count: 1,
        }
    }

    pub fn fold(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &Measurement) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Outcome of one store update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Created,
    Folded,
}

type Shard = Mutex<FxHashMap<Box<str>, Measurement>>;

pub struct AggregateStore {
    shards: Box<[Shard]>,
    shift: u32,
    registry: KeyRegistry,
    conflicts: AtomicU64,
}

impl AggregateStore {
    /// Creates a store with at least `shards` shards (rounded up to a power of two).
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1).next_power_of_two();
        Self {
            shards: (0..shards).map(|_| Mutex::new(FxHashMap::default())).collect(),
            shift: shards.trailing_zeros(),
            registry: KeyRegistry::new(),
            conflicts: AtomicU64::new(0),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    // The shard maps take bucket indices from the low hash bits and control
    // tags from the top 7, so the shard comes from the bits just below the tag.
    fn shard_index(&self, hash: u64) -> usize {
        if self.shift == 0 {
            return 0;
        }
        ((hash << 7) >> (64 - self.shift)) as usize
    }

    fn shard_for(&self, key: &str) -> &Shard {
        &self.shards[self.shard_index(FxBuildHasher.hash_one(key))]
    }

    /// Folds one value into `key`, creating the measurement on first sight.
    pub fn apply(&self, key: &str, value: f64) -> Applied {
        let mut shard = self.shard_for(key).lock();
        if let Some(m) = shard.get_mut(key) {
            m.fold(value);
            return Applied::Folded;
        }
        shard.insert(key.into(), Measurement::new(value));
        self.register(key);
        Applied::Created
    }

    /// Folds a partial aggregate into `key` as one indivisible update.
    pub fn merge(&self, key: &str, partial: &Measurement) -> Applied {
        let mut shard = self.shard_for(key).lock();
        if let Some(m) = shard.get_mut(key) {
            m.merge(partial);
            return Applied::Folded;
        }
        shard.insert(key.into(), *partial);
        self.register(key);
        Applied::Created
    }

    // Called with the key's shard lock held.
    fn register(&self, key: &str) {
        if !self.registry.register_if_new(key) {
            error!(key, "key created twice in aggregate store");
            self.conflicts.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get(&self, key: &str) -> Option<Measurement> {
        self.shard_for(key).lock().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn registry(&self) -> &KeyRegistry {
        &self.registry
    }

    /// Checks that the registry and the store agree on the key set.
    ///
    /// Only meaningful once ingestion has finished.
    pub fn verify(&self) -> Result<()> {
        let conflicts = self.conflicts.load(Ordering::Relaxed);
        if conflicts > 0 {
            return Err(Error::Invariant(format!(
                "{conflicts} keys were created more than once"
            )));
        }
        let (stored, registered) = (self.len(), self.registry.len());
        if stored != registered {
            return Err(Error::Invariant(format!(
                "store holds {stored} keys but registry holds {registered}"
            )));
        }
        Ok(())
    }
}

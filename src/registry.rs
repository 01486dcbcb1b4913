use parking_lot::Mutex;
use rustc_hash::FxHashSet;

#[derive(Default)]
struct KeyLog {
    seen: FxHashSet<Box<str>>,
    order: Vec<String>,
}

/// Duplicate-free record of every key created in the aggregate store.
///
/// Registrations arrive concurrently from the ingestion workers, but only for
/// new keys, so a single lock is uncontended once the key set settles.
#[derive(Default)]
pub struct KeyRegistry {
    log: Mutex<KeyLog>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `key` had not been registered before.
    pub fn register_if_new(&self, key: &str) -> bool {
        let mut log = self.log.lock();
        if log.seen.contains(key) {
            return false;
        }
        log.seen.insert(key.into());
        log.order.push(key.to_owned());
        true
    }

    pub fn len(&self) -> usize {
        self.log.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes every registered key in first-seen order.
    ///
    /// Only complete once all ingestion has finished; draining while workers
    /// are still running returns whatever was registered so far.
    pub fn drain(&self) -> Vec<String> {
        let mut log = self.log.lock();
        log.seen.clear();
        std::mem::take(&mut log.order)
    }
}

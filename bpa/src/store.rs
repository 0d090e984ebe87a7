use super::*;
use hashbrown::HashMap;

/// Persistent bundle storage.
///
/// The daemon records every pending bundle here and keeps the record current
/// as custody and forwarding state change.
pub trait Store: Send + Sync {
    fn add(&self, bundleid: u64, bundle: &bpv6::Bundle) -> bool;

    fn update(&self, bundleid: u64, bundle: &bpv6::Bundle) -> bool;

    fn del(&self, bundleid: u64) -> bool;
}

/// A store that keeps copies in memory, for tests and for nodes that do not
/// need bundles to survive a restart.
#[derive(Default)]
pub struct MemoryStore {
    bundles: spin::Mutex<HashMap<u64, bpv6::Bundle>>,
}

impl MemoryStore {
    pub fn get(&self, bundleid: u64) -> Option<bpv6::Bundle> {
        self.bundles.lock().get(&bundleid).cloned()
    }

    pub fn len(&self) -> usize {
        self.bundles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.lock().is_empty()
    }
}

impl Store for MemoryStore {
    fn add(&self, bundleid: u64, bundle: &bpv6::Bundle) -> bool {
        match self.bundles.lock().entry(bundleid) {
            hashbrown::hash_map::Entry::Occupied(_) => {
                warn!("Bundle *{bundleid} already stored");
                false
            }
            hashbrown::hash_map::Entry::Vacant(e) => {
                e.insert(bundle.clone());
                true
            }
        }
    }

    fn update(&self, bundleid: u64, bundle: &bpv6::Bundle) -> bool {
        match self.bundles.lock().get_mut(&bundleid) {
            Some(stored) => {
                *stored = bundle.clone();
                true
            }
            None => false,
        }
    }

    fn del(&self, bundleid: u64) -> bool {
        self.bundles.lock().remove(&bundleid).is_some()
    }
}

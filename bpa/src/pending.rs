use super::*;
use bundle::BundleRef;
use hashbrown::HashMap;

#[derive(Default)]
struct Table {
    bundles: HashMap<u64, (bpv6::BundleId, BundleRef)>,
    /// Local bundle ids by bundle identity.
    by_id: HashMap<bpv6::BundleId, Vec<u64>>,
}

/// The bundles currently held by the daemon, keyed by local bundle id and
/// indexed by bundle identity.
///
/// Each entry caches the bundle's identity as it was when added, which is
/// what duplicate detection compares.
#[derive(Default)]
pub struct PendingBundles {
    table: std::sync::Mutex<Table>,
}

impl PendingBundles {
    fn table(&self) -> std::sync::MutexGuard<'_, Table> {
        self.table.lock().trace_expect("Pending bundles lock poisoned")
    }

    /// Returns false if the bundle is already pending.
    pub fn add(&self, bundle: &BundleRef) -> bool {
        let id = bundle.id();
        let bundleid = bundle.bundleid();
        let mut table = self.table();
        match table.bundles.entry(bundleid) {
            hashbrown::hash_map::Entry::Occupied(_) => return false,
            hashbrown::hash_map::Entry::Vacant(e) => {
                e.insert((id.clone(), bundle.clone()));
            }
        }
        table.by_id.entry(id).or_default().push(bundleid);
        true
    }

    pub fn remove(&self, bundle: &BundleRef) -> bool {
        let bundleid = bundle.bundleid();
        let mut table = self.table();
        let Some((id, _)) = table.bundles.remove(&bundleid) else {
            return false;
        };
        if let hashbrown::hash_map::Entry::Occupied(mut e) = table.by_id.entry(id) {
            e.get_mut().retain(|b| *b != bundleid);
            if e.get().is_empty() {
                e.remove();
            }
        }
        true
    }

    pub fn contains(&self, bundle: &BundleRef) -> bool {
        self.table().bundles.contains_key(&bundle.bundleid())
    }

    pub fn len(&self) -> usize {
        self.table().bundles.len()
    }

    /// Every pending bundle.
    #[cfg(test)]
    pub fn all(&self) -> Vec<BundleRef> {
        self.table()
            .bundles
            .values()
            .map(|(_, bundle)| bundle.clone())
            .collect()
    }

    /// Every pending bundle with identity `id`.
    pub fn find(&self, id: &bpv6::BundleId) -> Vec<BundleRef> {
        let table = self.table();
        table
            .by_id
            .get(id)
            .map(|bundleids| {
                bundleids
                    .iter()
                    .filter_map(|b| table.bundles.get(b).map(|(_, bundle)| bundle.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// A pending bundle other than `bundle` with the same identity,
    /// preferring one this node holds custody of.
    pub fn find_duplicate(&self, bundle: &BundleRef) -> Option<BundleRef> {
        let id = bundle.id();
        let mut found = self.find(&id);
        found.retain(|b| b.bundleid() != bundle.bundleid());

        // Bundles are locked one at a time, outside the table lock
        match found.iter().position(|b| b.local_custody()) {
            Some(idx) => Some(found.swap_remove(idx)),
            None => found.into_iter().next(),
        }
    }

    /// The pending bundle with identity `id` that this node holds custody of.
    pub fn find_custody(&self, id: &bpv6::BundleId) -> Option<BundleRef> {
        self.find(id).into_iter().find(|b| b.local_custody())
    }
}

use super::*;
use bundle::BundleRef;
use cla::ConvergenceLayer;
use hashbrown::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    pub name: String,
    /// The largest encoded bundle the link accepts, 0 for no limit.
    pub mtu: u64,
    /// Whether the convergence layer reports reliably delivered bytes.
    pub reliable: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::new(),
            mtu: 0,
            reliable: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct LinkStats {
    pub bundles_queued: AtomicU64,
    pub bundles_transmitted: AtomicU64,
    pub bytes_transmitted: AtomicU64,
    pub bundles_cancelled: AtomicU64,
}

/// A link to a peer, with its send queue and in-flight list.
///
/// A bundle is on at most one of the two lists at a time.
pub struct Link {
    name: String,
    mtu: u64,
    reliable: bool,
    cla: Arc<dyn ConvergenceLayer>,
    deleted: AtomicBool,
    queue: std::sync::Mutex<Vec<BundleRef>>,
    inflight: std::sync::Mutex<Vec<BundleRef>>,
    pub stats: LinkStats,
}

impl Link {
    pub fn new(config: Config, cla: Arc<dyn ConvergenceLayer>) -> Arc<Self> {
        Arc::new(Self {
            name: config.name,
            mtu: config.mtu,
            reliable: config.reliable,
            cla,
            deleted: AtomicBool::new(false),
            queue: std::sync::Mutex::new(Vec::new()),
            inflight: std::sync::Mutex::new(Vec::new()),
            stats: LinkStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mtu(&self) -> u64 {
        self.mtu
    }

    pub fn is_reliable(&self) -> bool {
        self.reliable
    }

    pub fn cla(&self) -> &Arc<dyn ConvergenceLayer> {
        &self.cla
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub fn delete(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, Vec<BundleRef>> {
        self.queue.lock().trace_expect("Link queue lock poisoned")
    }

    fn inflight(&self) -> std::sync::MutexGuard<'_, Vec<BundleRef>> {
        self.inflight.lock().trace_expect("Link inflight lock poisoned")
    }

    /// Appends to the send queue, returning false if already queued.
    pub fn add_to_queue(&self, bundle: &BundleRef) -> bool {
        let mut queue = self.queue();
        if queue.iter().any(|b| b.bundleid() == bundle.bundleid()) {
            return false;
        }
        queue.push(bundle.clone());
        self.stats.bundles_queued.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn del_from_queue(&self, bundle: &BundleRef) -> bool {
        let mut queue = self.queue();
        match queue.iter().position(|b| b.bundleid() == bundle.bundleid()) {
            Some(idx) => {
                queue.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn add_to_inflight(&self, bundle: &BundleRef) -> bool {
        let mut inflight = self.inflight();
        if inflight.iter().any(|b| b.bundleid() == bundle.bundleid()) {
            return false;
        }
        inflight.push(bundle.clone());
        true
    }

    pub fn del_from_inflight(&self, bundle: &BundleRef) -> bool {
        let mut inflight = self.inflight();
        match inflight
            .iter()
            .position(|b| b.bundleid() == bundle.bundleid())
        {
            Some(idx) => {
                inflight.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn queue_contains(&self, bundle: &BundleRef) -> bool {
        self.queue()
            .iter()
            .any(|b| b.bundleid() == bundle.bundleid())
    }

    pub fn inflight_contains(&self, bundle: &BundleRef) -> bool {
        self.inflight()
            .iter()
            .any(|b| b.bundleid() == bundle.bundleid())
    }

    pub fn queue_len(&self) -> usize {
        self.queue().len()
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight().len()
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.name)
            .field("mtu", &self.mtu)
            .field("reliable", &self.reliable)
            .field("cla", &self.cla.name())
            .finish()
    }
}

/// The links known to the daemon, by name.
#[derive(Default)]
pub struct Links {
    links: spin::Mutex<HashMap<String, Arc<Link>>>,
}

impl Links {
    pub fn add(&self, link: Arc<Link>) -> bool {
        match self.links.lock().entry(link.name().to_string()) {
            hashbrown::hash_map::Entry::Occupied(_) => {
                warn!("Duplicate link name {}", link.name());
                false
            }
            hashbrown::hash_map::Entry::Vacant(e) => {
                info!("Added link {}", link.name());
                e.insert(link);
                true
            }
        }
    }

    pub fn find(&self, name: &str) -> Option<Arc<Link>> {
        self.links.lock().get(name).cloned()
    }

    /// Removes a link, marking it deleted for anyone still holding it.
    pub fn remove(&self, name: &str) -> Option<Arc<Link>> {
        let link = self.links.lock().remove(name)?;
        link.delete();
        info!("Removed link {name}");
        Some(link)
    }

    pub fn all(&self) -> Vec<Arc<Link>> {
        self.links.lock().values().cloned().collect()
    }
}

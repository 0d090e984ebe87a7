use super::*;
use hashbrown::HashMap;
use timer::TimerId;

/// The daemon's mutable view of a bundle.
#[derive(Debug, Default)]
pub struct BundleState {
    pub bundle: bpv6::Bundle,
    pub fwdlog: ForwardingLog,
    /// Transmit block lists, one per link the bundle is queued on.
    pub xmit_blocks: HashMap<String, Vec<bpv6::BlockInfo>>,
    pub custody_timers: Vec<(String, TimerId)>,
    pub expiration_timer: Option<TimerId>,
    /// Set when the bundle arrived short and was turned into a fragment.
    pub fragmented_incoming: bool,
}

/// A bundle held by the daemon, shared between stages.
///
/// `bundleid` is a local sequence number; it says nothing about whether two
/// bundles are duplicates, which is decided by [`bpv6::BundleId`].
pub struct Bundle {
    bundleid: u64,
    state: std::sync::Mutex<BundleState>,
}

pub type BundleRef = Arc<Bundle>;

impl Bundle {
    pub fn new(bundleid: u64, bundle: bpv6::Bundle) -> BundleRef {
        Arc::new(Self {
            bundleid,
            state: std::sync::Mutex::new(BundleState {
                bundle,
                ..Default::default()
            }),
        })
    }

    pub fn bundleid(&self) -> u64 {
        self.bundleid
    }

    /// Locks the bundle. The guard must not be held across a call that
    /// could lock the same bundle again.
    pub fn lock(&self) -> std::sync::MutexGuard<'_, BundleState> {
        self.state.lock().trace_expect("Bundle lock poisoned")
    }

    pub fn id(&self) -> bpv6::BundleId {
        self.lock().bundle.id()
    }

    /// A copy of the protocol bundle, for handing to collaborators.
    pub fn snapshot(&self) -> bpv6::Bundle {
        self.lock().bundle.clone()
    }

    pub fn local_custody(&self) -> bool {
        self.lock().bundle.local_custody
    }

    pub fn is_fragment(&self) -> bool {
        self.lock().bundle.is_fragment
    }
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bundle id {}", self.bundleid)
    }
}

impl std::fmt::Display for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "*{}", self.bundleid)
    }
}

impl PartialEq for Bundle {
    fn eq(&self, other: &Self) -> bool {
        self.bundleid == other.bundleid
    }
}

impl Eq for Bundle {}

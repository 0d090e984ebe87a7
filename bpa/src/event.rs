use super::*;
use bundle::BundleRef;

/// Where a received bundle came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EventSource {
    /// Received from a peer over a convergence layer.
    Peer,
    /// Sent by a local application.
    App,
    /// Reloaded from the bundle store.
    Store,
    /// An administrative bundle generated by this node.
    Admin,
    /// A fragment created by this node.
    Fragmentation,
    /// Injected by the router.
    Router,
    /// Returned after a failed restage.
    Restage,
}

impl EventSource {
    /// True for bundles that arrived from outside this node.
    pub fn is_received(self) -> bool {
        matches!(self, EventSource::Peer | EventSource::App)
    }

    pub fn is_generated(self) -> bool {
        matches!(
            self,
            EventSource::Admin | EventSource::Fragmentation | EventSource::Router
        )
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EventSource::Peer => "peer",
            EventSource::App => "application",
            EventSource::Store => "data store",
            EventSource::Admin => "admin",
            EventSource::Fragmentation => "fragmentation",
            EventSource::Router => "router",
            EventSource::Restage => "restage",
        })
    }
}

/// The events flowing between the daemon stages.
///
/// Each event is posted to the queue of the stage that handles it; a
/// `BundleReceived` is handled first by the input stage and then re-posted
/// to the output stage for routing and delivery.
#[derive(Debug)]
pub enum BundleEvent {
    BundleReceived {
        bundle: BundleRef,
        source: EventSource,
        bytes_received: u64,
        prevhop: bpv6::Eid,
        link: Option<String>,
    },
    BundleTransmitted {
        bundle: BundleRef,
        link: String,
        bytes_sent: u64,
        reliably_sent: u64,
        success: bool,
    },
    /// A restage attempt finished; on failure the bundle is re-driven
    /// through the input stage.
    BundleRestaged {
        bundle: BundleRef,
        link: String,
        success: bool,
    },
    BundleSendRequest {
        bundle: BundleRef,
        link: String,
        action: ForwardingAction,
    },
    BundleCancelRequest {
        bundle: BundleRef,
        link: String,
    },
    BundleSendCancelled {
        bundle: BundleRef,
        link: String,
    },
    BundleDeleteRequest {
        bundle: BundleRef,
        reason: bpv6::ReasonCode,
    },
    BundleExpired {
        bundle: BundleRef,
    },
    CustodyTimeout {
        bundle: BundleRef,
        link: String,
    },
    ReassemblyCompleted {
        bundle: BundleRef,
        fragments: Vec<BundleRef>,
    },
    AddBundleToAcs {
        custodian: bpv6::Eid,
        custody_id: u64,
        succeeded: bool,
        reason: bpv6::CustodyReason,
    },
    AcsExpired {
        key: String,
        pacs_id: u64,
    },
    /// A received aggregate custody signal for the ACS stage to process.
    AcsReceived {
        record: bpv6::AggregateCustodySignal,
    },
    Shutdown,
}

impl BundleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BundleEvent::BundleReceived { .. } => "BundleReceived",
            BundleEvent::BundleTransmitted { .. } => "BundleTransmitted",
            BundleEvent::BundleRestaged { .. } => "BundleRestaged",
            BundleEvent::BundleSendRequest { .. } => "BundleSendRequest",
            BundleEvent::BundleCancelRequest { .. } => "BundleCancelRequest",
            BundleEvent::BundleSendCancelled { .. } => "BundleSendCancelled",
            BundleEvent::BundleDeleteRequest { .. } => "BundleDeleteRequest",
            BundleEvent::BundleExpired { .. } => "BundleExpired",
            BundleEvent::CustodyTimeout { .. } => "CustodyTimeout",
            BundleEvent::ReassemblyCompleted { .. } => "ReassemblyCompleted",
            BundleEvent::AddBundleToAcs { .. } => "AddBundleToAcs",
            BundleEvent::AcsExpired { .. } => "AcsExpired",
            BundleEvent::AcsReceived { .. } => "AcsReceived",
            BundleEvent::Shutdown => "Shutdown",
        }
    }
}

use super::*;
use bundle::BundleRef;
use link::Link;

/// A convergence layer, which moves queued bundles over a link.
///
/// When a bundle is queued the daemon calls [`bundle_queued`]; the
/// convergence layer moves it from the link queue to the in-flight list,
/// sends it, and reports the outcome with
/// [`Daemon::bundle_transmitted`](crate::daemon::Daemon::bundle_transmitted).
///
/// [`bundle_queued`]: ConvergenceLayer::bundle_queued
pub trait ConvergenceLayer: Send + Sync {
    fn name(&self) -> &str;

    fn bundle_queued(&self, link: &Arc<Link>, bundle: &BundleRef);

    /// Aborts an in-flight send. The convergence layer still reports a
    /// (failed) transmission.
    fn cancel_bundle(&self, link: &Arc<Link>, bundle: &BundleRef);
}

/// A convergence layer that discards everything it is given, reporting each
/// bundle as sent in full.
pub struct NullConvergenceLayer {
    events: EventQueue,
}

impl NullConvergenceLayer {
    /// `events` is the output stage queue.
    pub fn new(events: EventQueue) -> Self {
        Self { events }
    }
}

impl ConvergenceLayer for NullConvergenceLayer {
    fn name(&self) -> &str {
        "null"
    }

    fn bundle_queued(&self, link: &Arc<Link>, bundle: &BundleRef) {
        if !link.del_from_queue(bundle) {
            return;
        }
        link.add_to_inflight(bundle);

        let bytes_sent = {
            let state = bundle.lock();
            state
                .xmit_blocks
                .get(link.name())
                .map(|blocks| bpv6::BundleProtocol::total_length(&state.bundle, blocks) as u64)
                .unwrap_or(0)
        };
        debug!("Null link {} discarding bundle {bundle}", link.name());

        self.events.post(event::BundleEvent::BundleTransmitted {
            bundle: bundle.clone(),
            link: link.name().to_string(),
            bytes_sent,
            reliably_sent: bytes_sent,
            success: true,
        });
    }

    fn cancel_bundle(&self, link: &Arc<Link>, bundle: &BundleRef) {
        debug!("Null link {} has nothing to cancel for {bundle}", link.name());
    }
}

use super::*;
use bundle::BundleRef;
use daemon::Daemon;
use event::{BundleEvent, EventSource};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("No such link")]
    UnknownLink,

    #[error("Link has been deleted")]
    LinkDeleted,

    #[error("Already queued or in flight")]
    AlreadyQueued,

    #[error("Failed to generate blocks: {0}")]
    Blocks(#[from] hardy_bpv6::prelude::Error),

    #[error("{0} bytes exceeds the link MTU and cannot be fragmented")]
    CannotFragment(usize),
}

/// How a bundle was committed to a link.
#[derive(Debug, PartialEq, Eq)]
pub enum Queued {
    Queued { total_length: usize },
    /// Too large for the link, so fragments were created in its place.
    Fragmented { fragments: usize },
}

/// The operations routers and stages use to move bundles onto links.
pub struct BundleActions<'a> {
    daemon: &'a Daemon,
}

impl<'a> BundleActions<'a> {
    pub fn new(daemon: &'a Daemon) -> Self {
        Self { daemon }
    }

    /// Commits `bundle` to the send queue of `link`, returning false if it
    /// was not queued.
    pub fn queue_bundle(
        &self,
        bundle: &BundleRef,
        link: &str,
        action: ForwardingAction,
        custody_spec: CustodyTimerSpec,
    ) -> bool {
        match self.try_queue_bundle(bundle, link, action, custody_spec) {
            Ok(queued) => {
                trace!("{bundle} on {link}: {queued:?}");
                true
            }
            Err(QueueError::AlreadyQueued) => {
                debug!("Ignoring request to queue {bundle} on {link}: already queued or in flight");
                false
            }
            Err(e) => {
                warn!("Failed to queue {bundle} on {link}: {e}");
                false
            }
        }
    }

    #[cfg_attr(feature = "instrument", instrument(skip(self, custody_spec)))]
    pub fn try_queue_bundle(
        &self,
        bundle: &BundleRef,
        link_name: &str,
        action: ForwardingAction,
        custody_spec: CustodyTimerSpec,
    ) -> Result<Queued, QueueError> {
        let Some(link) = self.daemon.links().find(link_name) else {
            bundle.lock().xmit_blocks.remove(link_name);
            return Err(QueueError::UnknownLink);
        };
        if link.is_deleted() {
            bundle.lock().xmit_blocks.remove(link_name);
            return Err(QueueError::LinkDeleted);
        }

        // The link lists are checked before the bundle is locked
        let listed = link.queue_contains(bundle) || link.inflight_contains(bundle);

        let mut state = bundle.lock();
        if listed {
            if state.xmit_blocks.contains_key(link_name) {
                return Err(QueueError::AlreadyQueued);
            }
            drop(state);
            error!("{bundle} is listed on link {link_name} with no transmit blocks");
            panic!("Bundle listed on a link without transmit blocks");
        }
        if state.xmit_blocks.remove(link_name).is_some() {
            debug!("Deleted stale transmit blocks of {bundle} for {link_name}");
        }

        let protocol = self.daemon.protocol();
        let mut blocks = protocol.prepare_blocks(&state.bundle, link_name);
        protocol.generate_blocks(&state.bundle, &mut blocks, link_name)?;
        let total_length = bpv6::BundleProtocol::total_length(&state.bundle, &blocks);

        // Left over from a shutdown while the bundle was queued
        if state.fwdlog.latest_state(link_name) == ForwardingState::Queued {
            state.fwdlog.update(link_name, ForwardingState::TransmitFailed);
        }

        let mtu = link.mtu() as usize;
        if mtu != 0 && total_length > mtu {
            info!("{bundle} is {total_length} bytes, over the {mtu} byte MTU of {link_name}");
            let Some(fragments) =
                fragment::proactively_fragment(protocol, &state.bundle, link_name, mtu)
            else {
                return Err(QueueError::CannotFragment(total_length));
            };
            state
                .fwdlog
                .add(link_name, action, ForwardingState::Suppressed, custody_spec);
            drop(state);

            let count = fragments.len();
            for fragment in fragments {
                self.daemon
                    .post_received(fragment, EventSource::Fragmentation, 0, bpv6::Eid::null(), None);
            }

            // The fragments replace the original
            self.daemon.input_queue().post_at_head(BundleEvent::BundleDeleteRequest {
                bundle: bundle.clone(),
                reason: bpv6::ReasonCode::NoAdditionalInformation,
            });
            return Ok(Queued::Fragmented { fragments: count });
        }

        state.xmit_blocks.insert(link_name.to_string(), blocks);
        state
            .fwdlog
            .add(link_name, action, ForwardingState::Queued, custody_spec);
        drop(state);

        if !link.add_to_queue(bundle) {
            error!("{bundle} appeared on the queue of {link_name} while being queued");
            panic!("Bundle queued twice on one link");
        }
        debug!("Queued {bundle} on {link_name}: {total_length} bytes");

        link.cla().bundle_queued(&link, bundle);
        Ok(Queued::Queued { total_length })
    }

    /// Withdraws `bundle` from `link`: from the send queue if it is still
    /// waiting, otherwise by asking the convergence layer to abort the send.
    pub fn cancel_bundle(&self, bundle: &BundleRef, link_name: &str) {
        let Some(link) = self.daemon.links().find(link_name) else {
            debug!("Cannot cancel {bundle} on unknown link {link_name}");
            return;
        };
        if link.is_deleted() {
            debug!("Cannot cancel {bundle} on deleted link {link_name}");
            return;
        }

        if link.del_from_queue(bundle) {
            link.stats
                .bundles_cancelled
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.daemon.output_queue().post(BundleEvent::BundleSendCancelled {
                bundle: bundle.clone(),
                link: link_name.to_string(),
            });
        } else if link.inflight_contains(bundle) {
            link.cla().cancel_bundle(&link, bundle);
        } else {
            warn!("Cancel of {bundle} but not queued or in flight on {link_name}");
        }
    }

    /// Asks for `bundle` to be deleted if it is still pending and the router
    /// has no further use for it.
    pub fn try_to_delete(&self, bundle: &BundleRef) -> bool {
        if !self.daemon.pending().contains(bundle) {
            return false;
        }
        if !self.daemon.router().can_delete_bundle(bundle) {
            trace!("Router is keeping {bundle}");
            return false;
        }
        self.daemon.input_queue().post(BundleEvent::BundleDeleteRequest {
            bundle: bundle.clone(),
            reason: bpv6::ReasonCode::NoAdditionalInformation,
        });
        true
    }
}

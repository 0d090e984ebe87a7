use super::*;

/// The output stage: routes accepted bundles, delivers them locally, and
/// tracks what happens to them on each link.
pub(crate) struct OutputStage {
    daemon: Arc<Daemon>,
}

impl OutputStage {
    pub fn new(daemon: Arc<Daemon>) -> Self {
        Self { daemon }
    }

    pub fn handle_event(&self, event: BundleEvent) {
        self.daemon.stats.output_events.increment();
        let actions = self.daemon.actions();

        let notify_router = match &event {
            BundleEvent::BundleReceived { bundle, source, .. } => {
                if !self.daemon.pending.contains(bundle) {
                    debug!("{bundle} is no longer pending");
                    return;
                }
                if *source != EventSource::Router {
                    self.deliver(bundle);
                }
                self.daemon.router.handle_event(&actions, &event);
                actions.try_to_delete(bundle);
                false
            }
            BundleEvent::BundleSendRequest {
                bundle,
                link,
                action,
            } => {
                actions.queue_bundle(bundle, link, *action, self.daemon.config.custody_timer);
                false
            }
            BundleEvent::BundleTransmitted {
                bundle,
                link,
                bytes_sent,
                reliably_sent,
                success,
            } => self.transmitted(bundle, link, *bytes_sent, *reliably_sent, *success),
            BundleEvent::BundleRestaged {
                bundle,
                link,
                success,
            } => self.restaged(bundle, link, *success),
            BundleEvent::BundleCancelRequest { bundle, link } => {
                actions.cancel_bundle(bundle, link);
                false
            }
            BundleEvent::BundleSendCancelled { bundle, link } => {
                let mut state = bundle.lock();
                state.xmit_blocks.remove(link.as_str());
                state.fwdlog.update(link, ForwardingState::Cancelled);
                debug!("Send of {bundle} on {link} cancelled");
                true
            }
            BundleEvent::CustodyTimeout { bundle, link } => self.custody_timeout(bundle, link),
            event => {
                warn!("Output stage ignoring {} event", event.name());
                false
            }
        };

        if notify_router {
            self.daemon.router.handle_event(&actions, &event);
        }
    }

    /// Delivers a whole bundle to the local registrations it matches.
    fn deliver(&self, bundle: &BundleRef) {
        let snapshot = {
            let state = bundle.lock();
            if state.bundle.is_fragment
                || (state.bundle.is_admin() && &state.bundle.destination == self.daemon.local_eid())
                || state.fwdlog.latest_state(LOCAL_DELIVERY) == ForwardingState::Delivered
            {
                return;
            }
            state.bundle.clone()
        };

        let registrations = self.daemon.registrations.find(&snapshot.destination);
        if registrations.is_empty() {
            return;
        }
        for registration in registrations {
            registration.deliver(&snapshot);
        }
        self.daemon.stats.delivered.increment();

        bundle.lock().fwdlog.add(
            LOCAL_DELIVERY,
            ForwardingAction::Forward,
            ForwardingState::Delivered,
            CustodyTimerSpec::default(),
        );
        if snapshot.flags.delivery_report_requested {
            self.daemon.send_status_report(
                &snapshot,
                bpv6::StatusFlag::Delivered,
                bpv6::ReasonCode::NoAdditionalInformation,
            );
        }
    }

    /// Handles the outcome of a send. A late event about a send that has
    /// already been dealt with is ignored.
    #[cfg_attr(feature = "instrument", instrument(skip(self)))]
    fn transmitted(
        &self,
        bundle: &BundleRef,
        link_name: &str,
        bytes_sent: u64,
        reliably_sent: u64,
        success: bool,
    ) -> bool {
        let Some(link) = self.daemon.links.find(link_name) else {
            warn!("Transmitted event for {bundle} on unknown link {link_name}");
            return false;
        };

        let mut guard = bundle.lock();
        let state = &mut *guard;
        if !state.xmit_blocks.contains_key(link_name) {
            info!("Redundant or conflicting transmitted event for {bundle} on {link_name}");
            return false;
        }

        if !link.del_from_inflight(bundle) {
            warn!("{bundle} was not in flight on {link_name}");
        }
        if link.del_from_queue(bundle) {
            warn!("{bundle} was unexpectedly still queued on {link_name}");
        }

        if !success {
            debug!("Send of {bundle} on {link_name} failed");
            state.xmit_blocks.remove(link_name);
            // The peer may have got some of it
            if state.bundle.local_custody {
                self.daemon.schedule_custody_timer(bundle, state, link_name);
            }
            state.fwdlog.update(link_name, ForwardingState::TransmitFailed);
            return true;
        }

        self.daemon.stats.transmitted.increment();
        link.stats.bundles_transmitted.fetch_add(1, Ordering::Relaxed);
        link.stats.bytes_transmitted.fetch_add(bytes_sent, Ordering::Relaxed);
        info!("{bundle} transmitted on {link_name}: {bytes_sent} bytes sent, {reliably_sent} reliably");

        if self.daemon.config.retry_reliable_unacked
            && link.is_reliable()
            && bytes_sent != reliably_sent
            && reliably_sent == 0
        {
            warn!("Nothing of {bundle} was acknowledged on {link_name}, treating as a failure");
            state.fwdlog.update(link_name, ForwardingState::TransmitFailed);
            state.xmit_blocks.remove(link_name);
            return true;
        }

        let latest = state.fwdlog.latest_state(link_name);
        if latest == ForwardingState::None {
            error!("No forwarding log entry for transmission of {bundle} on {link_name}");
            panic!("No forwarding log entry for transmission");
        }
        if latest != ForwardingState::Queued {
            error!("{bundle} forwarding state {latest} on {link_name}, expected QUEUED");
        }
        state.fwdlog.update(link_name, ForwardingState::Transmitted);

        let sent = if link.is_reliable() {
            reliably_sent
        } else {
            bytes_sent
        };
        let blocks = state.xmit_blocks.remove(link_name).unwrap_or_default();
        let tail = fragment::try_to_reactively_fragment(&state.bundle, &blocks, sent);

        if state.bundle.flags.forward_report_requested {
            self.daemon.send_status_report(
                &state.bundle,
                bpv6::StatusFlag::Forwarded,
                bpv6::ReasonCode::NoAdditionalInformation,
            );
        }
        if state.bundle.local_custody {
            self.daemon.schedule_custody_timer(bundle, state, link_name);
        }
        drop(guard);

        // The unsent tail is handled before anything else queued
        if let Some(tail) = tail {
            let tail = self.daemon.new_bundle(tail);
            info!("Reactively fragmented {bundle}, {tail} holds the unsent tail");
            self.daemon.input.post_at_head(BundleEvent::BundleReceived {
                bundle: tail,
                source: EventSource::Fragmentation,
                bytes_received: 0,
                prevhop: bpv6::Eid::null(),
                link: None,
            });
        }
        true
    }

    fn restaged(&self, bundle: &BundleRef, link: &str, success: bool) -> bool {
        if success {
            bundle.lock().fwdlog.update(link, ForwardingState::Transmitted);
            self.daemon.actions().try_to_delete(bundle);
            return true;
        }

        warn!("Restage of {bundle} from {link} failed, routing it again");
        bundle
            .lock()
            .fwdlog
            .update(link, ForwardingState::TransmitFailed);
        self.daemon.input.post(BundleEvent::BundleReceived {
            bundle: bundle.clone(),
            source: EventSource::Restage,
            bytes_received: 0,
            prevhop: bpv6::Eid::null(),
            link: None,
        });
        false
    }

    fn custody_timeout(&self, bundle: &BundleRef, link: &str) -> bool {
        if !self.daemon.pending.contains(bundle) {
            debug!("Custody timeout for {bundle}, which is no longer pending");
            return false;
        }

        let mut state = bundle.lock();
        state.custody_timers.retain(|(l, _)| l != link);
        if !state.bundle.local_custody {
            debug!("Custody timeout for {bundle} after custody was released");
            return false;
        }
        info!("Custody timeout for {bundle} on {link}");
        state.fwdlog.update(link, ForwardingState::CustodyTimeout);
        true
    }
}

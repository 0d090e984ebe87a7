use super::*;

/// The input stage: validates, de-duplicates and accepts received bundles,
/// handles custody acceptance, reassembly and deletion.
///
/// The reassembly table belongs to this stage alone.
pub(crate) struct InputStage {
    daemon: Arc<Daemon>,
    fragments: FragmentManager,
}

impl InputStage {
    pub fn new(daemon: Arc<Daemon>) -> Self {
        Self {
            fragments: FragmentManager::new(daemon.config.max_reassembly_length),
            daemon,
        }
    }

    pub fn handle_event(&mut self, event: BundleEvent) {
        self.daemon.stats.input_events.increment();
        match event {
            BundleEvent::BundleReceived {
                bundle,
                source,
                bytes_received,
                prevhop,
                link,
            } => self.bundle_received(bundle, source, bytes_received, prevhop, link),
            BundleEvent::ReassemblyCompleted { bundle, fragments } => {
                self.reassembly_completed(bundle, fragments)
            }
            BundleEvent::BundleDeleteRequest { bundle, reason } => {
                if self.daemon.pending.contains(&bundle) {
                    self.daemon
                        .delete_bundle(&bundle, reason, &mut self.fragments);
                } else {
                    debug!("Ignoring delete request for {bundle}: no longer pending");
                }
            }
            BundleEvent::BundleExpired { bundle } => {
                // The timer has fired, so there is nothing to cancel
                bundle.lock().expiration_timer = None;
                self.daemon.stats.expired.increment();
                info!("{bundle} expired");
                self.daemon.delete_bundle(
                    &bundle,
                    bpv6::ReasonCode::LifetimeExpired,
                    &mut self.fragments,
                );
            }
            event => warn!("Input stage ignoring {} event", event.name()),
        }
    }

    #[cfg_attr(feature = "instrument", instrument(skip_all, fields(bundle = %bundle)))]
    fn bundle_received(
        &mut self,
        bundle: BundleRef,
        source: EventSource,
        bytes_received: u64,
        prevhop: bpv6::Eid,
        link: Option<String>,
    ) {
        if source.is_received() {
            self.daemon.stats.received.increment();
        } else if source.is_generated() {
            self.daemon.stats.generated.increment();
        }
        info!("{bundle} received from {source}: {bytes_received} bytes");

        // A failed restage goes straight back to the router
        if source == EventSource::Restage && self.daemon.pending.contains(&bundle) {
            self.daemon.output.post(BundleEvent::BundleReceived {
                bundle,
                source,
                bytes_received,
                prevhop,
                link,
            });
            return;
        }

        {
            let mut state = bundle.lock();
            if state.bundle.expiration == 0 {
                warn!("{bundle} arrived with a zero expiration time");
            }
            if source == EventSource::Peer {
                if state.bundle.prevhop.is_null() {
                    state.bundle.prevhop = prevhop.clone();
                }
                if fragment::try_to_convert_to_fragment(&mut state.bundle) {
                    info!("{bundle} arrived short, keeping it as a fragment");
                    state.fragmented_incoming = true;
                }
            }
        }

        if source == EventSource::Peer && !self.validate_and_accept(&bundle) {
            return;
        }

        let duplicate = self.daemon.pending.find_duplicate(&bundle);
        if let Some(duplicate) = &duplicate {
            self.daemon.stats.duplicate.increment();
            info!("{bundle} is a duplicate of {duplicate}");

            let duplicate_custody = duplicate.local_custody();
            let redundant = {
                let state = bundle.lock();
                let redundant = state.bundle.flags.custody_requested && duplicate_custody;
                if redundant {
                    self.daemon.generate_custody_signal(
                        &state.bundle,
                        false,
                        bpv6::CustodyReason::RedundantReception,
                    );
                }
                redundant
            };

            if self.daemon.config.suppress_duplicates || redundant {
                self.daemon.delete_bundle(
                    &bundle,
                    bpv6::ReasonCode::NoAdditionalInformation,
                    &mut self.fragments,
                );
                return;
            }
        }

        // Never forward or deliver a bundle that has already expired
        if bundle.lock().bundle.has_expired() {
            info!("{bundle} arrived already expired");
            self.daemon.stats.expired.increment();
            self.daemon.delete_bundle(
                &bundle,
                bpv6::ReasonCode::LifetimeExpired,
                &mut self.fragments,
            );
            return;
        }

        if !self
            .daemon
            .add_to_pending(&bundle, source != EventSource::Store)
        {
            return;
        }

        if let (EventSource::Peer, Some(link)) = (source, &link) {
            bundle.lock().fwdlog.add(
                link,
                ForwardingAction::Forward,
                ForwardingState::Received,
                CustodyTimerSpec::default(),
            );
        }

        self.custody(&bundle, source, duplicate.as_ref());

        // The bundle this one duplicates has been delivered or reassembled
        // already
        if duplicate.is_some() {
            return;
        }

        let (is_fragment, is_admin, destination) = {
            let state = bundle.lock();
            if !state.bundle.is_fragment {
                for obsolete in self.fragments.delete_obsoleted_fragments(&state.bundle) {
                    self.daemon
                        .request_delete(&obsolete, bpv6::ReasonCode::NoAdditionalInformation);
                }
            }
            (
                state.bundle.is_fragment,
                state.bundle.is_admin(),
                state.bundle.destination.clone(),
            )
        };

        let for_admin = &destination == self.daemon.local_eid();
        let is_local =
            for_admin || !self.daemon.registrations.find(&destination).is_empty();
        if is_local {
            if is_fragment {
                if source != EventSource::Fragmentation && !self.reassemble(&bundle) {
                    return;
                }
            } else if is_admin && for_admin {
                self.admin_record(&bundle);
            }
        }

        self.daemon.output.post(BundleEvent::BundleReceived {
            bundle,
            source,
            bytes_received,
            prevhop,
            link,
        });
    }

    /// Runs block validation and the router's acceptance check on a bundle
    /// from a peer, deleting it if either fails.
    fn validate_and_accept(&mut self, bundle: &BundleRef) -> bool {
        let mut reception_reason = bpv6::ReasonCode::NoAdditionalInformation;
        let mut deletion_reason = bpv6::ReasonCode::NoAdditionalInformation;

        let accepted = {
            let state = bundle.lock();
            let valid = self.daemon.protocol.validate(
                &state.bundle,
                &mut reception_reason,
                &mut deletion_reason,
            );

            if state.bundle.flags.receive_report_requested
                || reception_reason != bpv6::ReasonCode::NoAdditionalInformation
            {
                self.daemon.send_status_report(
                    &state.bundle,
                    bpv6::StatusFlag::Received,
                    reception_reason,
                );
            }

            valid && {
                let mut reason = bpv6::ReasonCode::NoAdditionalInformation;
                let accept = self.daemon.router.accept_bundle(&state.bundle, &mut reason);
                if !accept {
                    deletion_reason = reason;
                }
                accept
            }
        };

        if !accepted {
            self.daemon.stats.rejected.increment();
            info!("Rejected {bundle}: {deletion_reason}");
            self.daemon
                .delete_bundle(bundle, deletion_reason, &mut self.fragments);
        }
        accepted
    }

    fn custody(&self, bundle: &BundleRef, source: EventSource, duplicate: Option<&BundleRef>) {
        let (local_custody, custody_id, wants_custody) = {
            let state = bundle.lock();
            (
                state.bundle.local_custody,
                state.bundle.custody_id,
                state.bundle.flags.custody_requested
                    && self.daemon.config.accept_custody
                    && self.daemon.router.accept_custody(&state.bundle),
            )
        };

        if local_custody {
            // Reloaded from the store with custody already taken
            if custody_id > 0 {
                self.daemon.acs.add_custody_id(custody_id, bundle);
            }
        } else if wants_custody
            && source != EventSource::Store
            && !duplicate.is_some_and(|d| d.local_custody())
        {
            self.daemon.accept_custody(bundle);
        }
    }

    /// Returns false if the fragment was refused and has been deleted.
    fn reassemble(&mut self, bundle: &BundleRef) -> bool {
        debug!("Deferring delivery of fragment {bundle} until reassembly");
        match self.fragments.process_for_reassembly(bundle) {
            Ok(Some(reassembled)) => {
                let whole = self.daemon.new_bundle(reassembled.bundle);
                self.daemon
                    .input
                    .post_at_head(BundleEvent::ReassemblyCompleted {
                        bundle: whole,
                        fragments: reassembled.fragments,
                    });
                true
            }
            Ok(None) => true,
            Err(e) => {
                warn!("Refusing fragment {bundle} for reassembly: {e}");
                self.daemon
                    .delete_bundle(bundle, e.reason(), &mut self.fragments);
                false
            }
        }
    }

    fn reassembly_completed(&mut self, bundle: BundleRef, fragments: Vec<BundleRef>) {
        info!(
            "Reassembled {bundle} from {} fragments",
            fragments.len()
        );
        for fragment in fragments {
            self.daemon.delete_bundle(
                &fragment,
                bpv6::ReasonCode::NoAdditionalInformation,
                &mut self.fragments,
            );
        }

        self.daemon
            .input
            .post_at_head(BundleEvent::BundleReceived {
                bundle,
                source: EventSource::Fragmentation,
                bytes_received: 0,
                prevhop: bpv6::Eid::null(),
                link: None,
            });
    }

    /// Handles an administrative record addressed to this node.
    fn admin_record(&self, bundle: &BundleRef) {
        let payload = {
            let mut state = bundle.lock();
            state.fwdlog.add(
                LOCAL_DELIVERY,
                ForwardingAction::Forward,
                ForwardingState::Delivered,
                CustodyTimerSpec::default(),
            );
            state.bundle.payload.clone()
        };

        match bpv6::AdministrativeRecord::parse(&payload) {
            Err(e) => warn!("Invalid administrative record in {bundle}: {e}"),
            Ok(bpv6::AdministrativeRecord::StatusReport(report)) => {
                info!(
                    "Status report for {} {}: {}",
                    report.source, report.creation_ts, report.reason
                );
            }
            Ok(bpv6::AdministrativeRecord::CustodySignal(signal)) => self.custody_signal(signal),
            Ok(bpv6::AdministrativeRecord::AggregateCustodySignal(record)) => {
                self.daemon
                    .acs_queue
                    .post(BundleEvent::AcsReceived { record });
            }
        }
    }

    fn custody_signal(&self, signal: bpv6::CustodySignal) {
        let id = bpv6::BundleId {
            source: signal.source,
            timestamp: signal.creation_ts,
            fragment_info: signal.fragment,
        };
        info!(
            "Custody signal for {id}: {} ({})",
            if signal.succeeded { "succeeded" } else { "failed" },
            signal.reason
        );

        let Some(orig) = self.daemon.pending.find_custody(&id) else {
            warn!("Custody signal for {id} but this node does not have custody");
            return;
        };

        // A failure because the next hop already has the bundle is as good
        // as an acceptance
        if signal.succeeded || signal.reason == bpv6::CustodyReason::RedundantReception {
            self.daemon.release_custody(&orig);
            self.daemon.actions().try_to_delete(&orig);
        }
    }
}

use super::*;

/// The ACS stage: accumulates outgoing aggregate custody signals and
/// processes incoming ones.
pub(crate) struct AcsStage {
    daemon: Arc<Daemon>,
}

impl AcsStage {
    pub fn new(daemon: Arc<Daemon>) -> Self {
        Self { daemon }
    }

    pub fn handle_event(&self, event: BundleEvent) {
        self.daemon.stats.acs_events.increment();
        match event {
            BundleEvent::AddBundleToAcs {
                custodian,
                custody_id,
                succeeded,
                reason,
            } => {
                trace!("Adding custody id {custody_id} to ACS for {custodian}");
                if let Some(flushed) = self.daemon.acs.add(&custodian, custody_id, succeeded, reason)
                {
                    self.send(flushed);
                }
            }
            BundleEvent::AcsExpired { key, pacs_id } => {
                if let Some(flushed) = self.daemon.acs.expire(&key, pacs_id) {
                    self.send(flushed);
                }
            }
            BundleEvent::AcsReceived { record } => self.process_acs(&record),
            event => warn!("ACS stage ignoring {} event", event.name()),
        }
    }

    fn send(&self, flushed: acs::Flushed) {
        let bundle = flushed.signal.create_bundle(
            &flushed.custodian,
            self.daemon.local_eid(),
            self.daemon.next_creation_ts(),
            self.daemon.config.admin_expiration,
        );
        info!(
            "Sending ACS to {}: {} ({}), {} bytes of fills",
            flushed.custodian,
            if flushed.signal.succeeded { "succeeded" } else { "failed" },
            flushed.signal.reason,
            flushed.signal.fills_len()
        );
        self.daemon.stats.acs_generated.increment();
        self.daemon
            .post_received(bundle, EventSource::Admin, 0, bpv6::Eid::null(), None);
    }

    /// Releases custody of every bundle a received signal acknowledges.
    #[cfg_attr(feature = "instrument", instrument(skip_all))]
    fn process_acs(&self, record: &bpv6::AggregateCustodySignal) {
        // A failure for a redundant reception still means the next hop has it
        if !record.succeeded && record.reason != bpv6::CustodyReason::RedundantReception {
            info!("ACS reports custody refused: {}", record.reason);
            self.daemon.stats.acs_invalid.increment();
            return;
        }
        if record.fills.is_empty() {
            warn!("ACS with no custody ids");
            self.daemon.stats.acs_invalid.increment();
            return;
        }

        let last = self.daemon.acs.last_custody_id();
        let mut released = 0;
        for custody_id in record.custody_ids() {
            if custody_id > last {
                error!("ACS holds custody id {custody_id}, but the last issued is {last}");
                self.daemon.stats.acs_invalid.increment();
                break;
            }

            let Some(bundle) = self.daemon.acs.find_custody_id(custody_id) else {
                debug!("ACS custody id {custody_id} not found");
                self.daemon.stats.acs_not_found.increment();
                continue;
            };
            if !bundle.local_custody() {
                warn!("ACS custody id {custody_id} is for {bundle}, which is not in custody");
                continue;
            }

            self.daemon.release_custody(&bundle);
            self.daemon.actions().try_to_delete(&bundle);
            if record.succeeded {
                self.daemon.stats.acs_released.increment();
            } else {
                self.daemon.stats.acs_redundant.increment();
            }
            released += 1;
        }
        debug!("ACS released custody of {released} bundles");
    }
}

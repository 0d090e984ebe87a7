/*!
The bundle daemon: the state shared by the input, output and ACS stages,
and the threads that run them.

Each stage owns one event queue and handles its events one at a time on its
own thread. Stages talk to each other only by posting events; anything two
stages both touch is behind the bundle lock or a table lock.
*/

use super::*;
use acs::Acs;
use actions::BundleActions;
use bundle::{BundleRef, BundleState};
use config::Config;
use event::{BundleEvent, EventSource};
use fragment::FragmentManager;
use link::Links;
use pending::PendingBundles;
use registration::Registrations;
use router::Router;
use std::sync::atomic::{AtomicU64, Ordering};
use store::Store;
use timer::Timers;

mod acs_stage;
mod input;
mod output;

#[cfg(test)]
mod tests;

/// The name used in forwarding logs for local delivery.
pub const LOCAL_DELIVERY: &str = "local";

/// A statistic, mirrored to a `metrics` counter.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    value: AtomicU64,
}

impl Counter {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: AtomicU64::new(0),
        }
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(self.name).increment(1);
    }
}

#[derive(Debug)]
pub struct Stats {
    pub received: Counter,
    pub generated: Counter,
    pub duplicate: Counter,
    pub rejected: Counter,
    pub transmitted: Counter,
    pub expired: Counter,
    pub deleted: Counter,
    pub delivered: Counter,
    pub input_events: Counter,
    pub output_events: Counter,
    pub acs_events: Counter,
    pub acs_generated: Counter,
    pub acs_released: Counter,
    pub acs_redundant: Counter,
    pub acs_not_found: Counter,
    pub acs_invalid: Counter,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            received: Counter::new("bundles_received"),
            generated: Counter::new("bundles_generated"),
            duplicate: Counter::new("duplicate_bundles"),
            rejected: Counter::new("rejected_bundles"),
            transmitted: Counter::new("bundles_transmitted"),
            expired: Counter::new("expired_bundles"),
            deleted: Counter::new("deleted_bundles"),
            delivered: Counter::new("delivered_bundles"),
            input_events: Counter::new("input_events_processed"),
            output_events: Counter::new("output_events_processed"),
            acs_events: Counter::new("acs_events_processed"),
            acs_generated: Counter::new("acs_generated"),
            acs_released: Counter::new("acs_custody_released"),
            acs_redundant: Counter::new("acs_custody_redundant"),
            acs_not_found: Counter::new("acs_custody_not_found"),
            acs_invalid: Counter::new("acs_invalid"),
        }
    }
}

impl Stats {
    fn describe(&self) {
        for (counter, description) in [
            (&self.received, "Bundles received from peers and applications"),
            (&self.generated, "Bundles generated by this node"),
            (&self.duplicate, "Duplicate bundles received"),
            (&self.rejected, "Received bundles rejected by validation or the router"),
            (&self.transmitted, "Bundles transmitted"),
            (&self.expired, "Bundles whose lifetime expired"),
            (&self.deleted, "Bundles deleted"),
            (&self.delivered, "Bundles delivered to local registrations"),
            (&self.acs_generated, "Aggregate custody signals generated"),
        ] {
            metrics::describe_counter!(counter.name, metrics::Unit::Count, description);
        }
    }
}

pub struct Daemon {
    config: Config,
    protocol: bpv6::BundleProtocol,
    router: Arc<dyn Router>,
    store: Arc<dyn Store>,
    timers: Arc<dyn Timers>,
    links: Links,
    registrations: Registrations,
    pending: PendingBundles,
    acs: Acs,
    input: EventQueue,
    output: EventQueue,
    acs_queue: EventQueue,
    next_bundleid: AtomicU64,
    last_creation_ts: spin::Mutex<bpv6::CreationTimestamp>,
    stats: Stats,
    threads: std::sync::Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl Daemon {
    pub fn new(
        config: Config,
        router: Arc<dyn Router>,
        store: Arc<dyn Store>,
        timers: Arc<dyn Timers>,
    ) -> Arc<Self> {
        let acs_queue = EventQueue::new();
        Arc::new(Self {
            protocol: bpv6::BundleProtocol::new(config.metadata_length_mode),
            acs: Acs::new(&config.acs, timers.clone(), acs_queue.clone()),
            config,
            router,
            store,
            timers,
            links: Links::default(),
            registrations: Registrations::default(),
            pending: PendingBundles::default(),
            input: EventQueue::new(),
            output: EventQueue::new(),
            acs_queue,
            next_bundleid: AtomicU64::new(1),
            last_creation_ts: spin::Mutex::new(bpv6::CreationTimestamp::default()),
            stats: Stats::default(),
            threads: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn local_eid(&self) -> &bpv6::Eid {
        &self.config.local_eid
    }

    pub fn protocol(&self) -> &bpv6::BundleProtocol {
        &self.protocol
    }

    pub fn router(&self) -> &Arc<dyn Router> {
        &self.router
    }

    pub fn links(&self) -> &Links {
        &self.links
    }

    pub fn registrations(&self) -> &Registrations {
        &self.registrations
    }

    pub fn acs(&self) -> &Acs {
        &self.acs
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub(crate) fn pending(&self) -> &PendingBundles {
        &self.pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, bundle: &BundleRef) -> bool {
        self.pending.contains(bundle)
    }

    pub fn input_queue(&self) -> &EventQueue {
        &self.input
    }

    pub fn output_queue(&self) -> &EventQueue {
        &self.output
    }

    pub fn acs_queue(&self) -> &EventQueue {
        &self.acs_queue
    }

    pub fn actions(&self) -> BundleActions<'_> {
        BundleActions::new(self)
    }

    /// Wraps a protocol bundle with the next local bundle id.
    pub fn new_bundle(&self, bundle: bpv6::Bundle) -> BundleRef {
        bundle::Bundle::new(self.next_bundleid.fetch_add(1, Ordering::Relaxed), bundle)
    }

    /// A creation timestamp for a bundle generated here, unique to this node.
    pub fn next_creation_ts(&self) -> bpv6::CreationTimestamp {
        let now = bpv6::DtnTime::now().seconds();
        let mut last = self.last_creation_ts.lock();
        *last = if now <= last.seconds {
            bpv6::CreationTimestamp::new(last.seconds, last.seqno + 1)
        } else {
            bpv6::CreationTimestamp::new(now, 0)
        };
        *last
    }

    /// Hands a bundle to the input stage.
    pub fn post_received(
        &self,
        bundle: bpv6::Bundle,
        source: EventSource,
        bytes_received: u64,
        prevhop: bpv6::Eid,
        link: Option<String>,
    ) -> BundleRef {
        let bundle = self.new_bundle(bundle);
        self.input.post(BundleEvent::BundleReceived {
            bundle: bundle.clone(),
            source,
            bytes_received,
            prevhop,
            link,
        });
        bundle
    }

    /// Parses a bundle received from `prevhop` over `link`. A bundle whose
    /// payload was cut short is accepted as a fragment of what arrived.
    pub fn receive_bytes(
        &self,
        buf: &[u8],
        link: &str,
        prevhop: bpv6::Eid,
    ) -> Result<BundleRef, bpv6::Error> {
        let (bundle, consumed) = self.protocol.consume(buf)?;
        Ok(self.post_received(
            bundle,
            EventSource::Peer,
            consumed as u64,
            prevhop,
            Some(link.to_string()),
        ))
    }

    /// Sends a bundle on behalf of a local application.
    pub fn send(&self, bundle: bpv6::Bundle) -> BundleRef {
        let len = bundle.payload.len() as u64;
        self.post_received(bundle, EventSource::App, len, bpv6::Eid::null(), None)
    }

    /// Re-injects a bundle read back from the store.
    pub fn reload(&self, bundle: bpv6::Bundle) -> BundleRef {
        self.post_received(bundle, EventSource::Store, 0, bpv6::Eid::null(), None)
    }

    /// Called by a convergence layer when a send finishes.
    pub fn bundle_transmitted(
        &self,
        bundle: &BundleRef,
        link: &str,
        bytes_sent: u64,
        reliably_sent: u64,
        success: bool,
    ) {
        self.output.post(BundleEvent::BundleTransmitted {
            bundle: bundle.clone(),
            link: link.to_string(),
            bytes_sent,
            reliably_sent,
            success,
        });
    }

    pub fn bundle_restaged(&self, bundle: &BundleRef, link: &str, success: bool) {
        self.output.post(BundleEvent::BundleRestaged {
            bundle: bundle.clone(),
            link: link.to_string(),
            success,
        });
    }

    pub fn request_send(&self, bundle: &BundleRef, link: &str, action: ForwardingAction) {
        self.output.post(BundleEvent::BundleSendRequest {
            bundle: bundle.clone(),
            link: link.to_string(),
            action,
        });
    }

    pub fn request_cancel(&self, bundle: &BundleRef, link: &str) {
        self.output.post(BundleEvent::BundleCancelRequest {
            bundle: bundle.clone(),
            link: link.to_string(),
        });
    }

    pub fn request_delete(&self, bundle: &BundleRef, reason: bpv6::ReasonCode) {
        self.input.post(BundleEvent::BundleDeleteRequest {
            bundle: bundle.clone(),
            reason,
        });
    }

    /// Generates a status report about `bundle`, if reports are enabled.
    pub fn send_status_report(
        &self,
        bundle: &bpv6::Bundle,
        flag: bpv6::StatusFlag,
        reason: bpv6::ReasonCode,
    ) {
        if !self.config.status_reports {
            return;
        }
        if bundle.is_admin() {
            trace!("No status reports about administrative records");
            return;
        }
        if bundle.source.is_null() && bundle.replyto.is_null() {
            debug!("Status report for {} has nowhere to go", bundle.id());
            return;
        }

        debug!("Sending {flag} status report for {}: {reason}", bundle.id());
        let report = bpv6::StatusReport::create_bundle(
            bundle,
            self.local_eid(),
            flag,
            reason,
            self.next_creation_ts(),
        );
        self.post_received(report, EventSource::Admin, 0, bpv6::Eid::null(), None);
    }

    /// Signals the custodian of `bundle`. Signals for bundles carrying a
    /// custody id from a custodian that aggregates go to the ACS stage.
    pub fn generate_custody_signal(
        &self,
        bundle: &bpv6::Bundle,
        succeeded: bool,
        reason: bpv6::CustodyReason,
    ) {
        if bundle.local_custody {
            error!("Custody signal for {} but this node has custody", bundle.id());
            return;
        }
        if bundle.custodian.is_null() {
            error!("Custody signal for {} but its custodian is null", bundle.id());
            return;
        }

        if let Some(cteb) = bundle.received_cteb() {
            if self.acs.enabled_for(&bundle.custodian) {
                self.acs_queue.post(BundleEvent::AddBundleToAcs {
                    custodian: bundle.custodian.clone(),
                    custody_id: cteb.custody_id,
                    succeeded,
                    reason,
                });
                return;
            }
        }

        let signal = bpv6::CustodySignal::create_bundle(
            bundle,
            self.local_eid(),
            succeeded,
            reason,
            self.next_creation_ts(),
        );
        self.post_received(signal, EventSource::Admin, 0, bpv6::Eid::null(), None);
    }

    /// Takes custody of `bundle`, acknowledging its previous custodian.
    #[cfg_attr(feature = "instrument", instrument(skip(self)))]
    pub fn accept_custody(&self, bundle: &BundleRef) {
        let mut state = bundle.lock();
        if state.bundle.local_custody {
            error!("Already have custody of {bundle}");
            return;
        }
        if &state.bundle.custodian == self.local_eid() {
            error!("Custodian of {bundle} is already this node");
            return;
        }
        info!("Accepting custody of {bundle}");

        if !state.bundle.custodian.is_null() {
            self.generate_custody_signal(
                &state.bundle,
                true,
                bpv6::CustodyReason::NoAdditionalInfo,
            );
        }

        state.bundle.custodian = self.local_eid().clone();
        state.bundle.local_custody = true;
        self.acs.accept_custody(bundle, &mut state);
        self.store.update(bundle.bundleid(), &state.bundle);

        if state.bundle.flags.custody_report_requested {
            self.send_status_report(
                &state.bundle,
                bpv6::StatusFlag::CustodyAccepted,
                bpv6::ReasonCode::NoAdditionalInformation,
            );
        }
    }

    /// Gives up custody of `bundle`, cancelling its custody timers.
    pub fn release_custody(&self, bundle: &BundleRef) {
        let (timers, custody_id) = {
            let mut state = bundle.lock();
            if !state.bundle.local_custody {
                error!("Release of custody of {bundle} but this node does not have custody");
                return;
            }
            state.bundle.custodian = bpv6::Eid::null();
            state.bundle.local_custody = false;
            self.store.update(bundle.bundleid(), &state.bundle);
            (
                std::mem::take(&mut state.custody_timers),
                state.bundle.custody_id,
            )
        };

        for (_, timer) in timers {
            self.timers.cancel(timer);
        }
        if custody_id > 0 {
            self.acs.erase_custody_id(custody_id);
        }
        debug!("Released custody of {bundle}");
    }

    /// Arms a custody timer for `bundle` on `link`, from the spec of its
    /// latest forwarding log entry there.
    fn schedule_custody_timer(&self, bundle: &BundleRef, state: &mut BundleState, link: &str) {
        let spec = state
            .fwdlog
            .latest(link)
            .map(|info| info.custody_spec)
            .unwrap_or(self.config.custody_timer);
        let delay = spec.timeout(state.bundle.expiration);
        let timer = self.timers.schedule_in(
            delay,
            &self.output,
            BundleEvent::CustodyTimeout {
                bundle: bundle.clone(),
                link: link.to_string(),
            },
        );
        trace!("Custody timer for {bundle} on {link} in {delay:?}");
        state.custody_timers.push((link.to_string(), timer));
    }

    /// Adds `bundle` to the pending table and arms its expiration timer,
    /// recording it in the store unless it came from there.
    pub(crate) fn add_to_pending(&self, bundle: &BundleRef, add_to_store: bool) -> bool {
        if !self.pending.add(bundle) {
            warn!("{bundle} is already pending");
            return false;
        }

        let mut state = bundle.lock();
        if add_to_store {
            self.store.add(bundle.bundleid(), &state.bundle);
        }

        let remaining = state.bundle.expiry() - time::OffsetDateTime::now_utc();
        let delay = std::time::Duration::try_from(remaining).unwrap_or_default();
        state.expiration_timer = Some(self.timers.schedule_in(
            delay,
            &self.input,
            BundleEvent::BundleExpired {
                bundle: bundle.clone(),
            },
        ));
        true
    }

    pub(crate) fn remove_from_pending(&self, bundle: &BundleRef) -> bool {
        if !self.pending.remove(bundle) {
            return false;
        }
        let timer = bundle.lock().expiration_timer.take();
        if let Some(timer) = timer {
            self.timers.cancel(timer);
        }
        self.store.del(bundle.bundleid());
        true
    }

    /// Drops `bundle` from the node, reporting the deletion if it was in
    /// custody or the report was requested with a reason.
    pub(crate) fn delete_bundle(
        &self,
        bundle: &BundleRef,
        reason: bpv6::ReasonCode,
        fragments: &mut FragmentManager,
    ) -> bool {
        let (local_custody, report_requested, is_fragment) = {
            let state = bundle.lock();
            (
                state.bundle.local_custody,
                state.bundle.flags.delete_report_requested,
                state.bundle.is_fragment,
            )
        };
        info!("Deleting {bundle}: {reason}");

        let send_status = local_custody
            || (report_requested && reason != bpv6::ReasonCode::NoAdditionalInformation);
        if local_custody {
            self.release_custody(bundle);
        }
        if is_fragment {
            fragments.delete_fragment(bundle);
        }

        let erased = self.remove_from_pending(bundle);
        if erased {
            self.stats.deleted.increment();
        }
        if send_status {
            self.send_status_report(
                &bundle.lock().bundle,
                bpv6::StatusFlag::Deleted,
                reason,
            );
        }

        for link in self.links.all() {
            if link.queue_contains(bundle) || link.inflight_contains(bundle) {
                self.actions().cancel_bundle(bundle, link.name());
            }
        }
        erased
    }

    /// Starts the stage threads.
    pub fn start(self: &Arc<Self>) -> std::io::Result<()> {
        self.stats.describe();
        let wait = std::time::Duration::from_millis(self.config.event_wait_ms);

        let handles = vec![
            spawn_stage("bpv6-input", self.input.clone(), wait, {
                let mut stage = input::InputStage::new(self.clone());
                move |event| stage.handle_event(event)
            })?,
            spawn_stage("bpv6-output", self.output.clone(), wait, {
                let stage = output::OutputStage::new(self.clone());
                move |event| stage.handle_event(event)
            })?,
            spawn_stage("bpv6-acs", self.acs_queue.clone(), wait, {
                let stage = acs_stage::AcsStage::new(self.clone());
                move |event| stage.handle_event(event)
            })?,
        ];
        self.threads
            .lock()
            .trace_expect("Daemon thread lock poisoned")
            .extend(handles);

        info!("Bundle daemon started as {}", self.local_eid());
        Ok(())
    }

    /// Stops the stage threads, after each has finished the event in hand.
    pub fn shutdown(&self) {
        for queue in [&self.input, &self.output, &self.acs_queue] {
            queue.post_at_head(BundleEvent::Shutdown);
        }

        let handles = std::mem::take(
            &mut *self.threads.lock().trace_expect("Daemon thread lock poisoned"),
        );
        for handle in handles {
            if handle.join().is_err() {
                error!("Stage thread panicked");
            }
        }
        info!("Bundle daemon stopped");
    }
}

fn spawn_stage(
    name: &str,
    queue: EventQueue,
    wait: std::time::Duration,
    mut handler: impl FnMut(BundleEvent) + Send + 'static,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    let stage = name.to_string();
    std::thread::Builder::new().name(stage.clone()).spawn(move || {
        debug!("Stage {stage} running");
        loop {
            match queue.recv_timeout(wait) {
                Some(BundleEvent::Shutdown) => break,
                Some(event) => handler(event),
                None => {}
            }
        }
        debug!("Stage {stage} stopped");
    })
}

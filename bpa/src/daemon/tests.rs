use super::*;
use acs_stage::AcsStage;
use cla::ConvergenceLayer;
use input::InputStage;
use link::Link;
use output::OutputStage;
use registration::Registration;
use router::{Route, StaticRouter};
use store::MemoryStore;
use timer::ManualTimers;

/// A convergence layer that records what it is given and reports nothing,
/// so tests decide how each send ends.
#[derive(Default)]
struct RecordingCla {
    /// Leave queued bundles on the link queue rather than taking them.
    hold: bool,
    queued: std::sync::Mutex<Vec<BundleRef>>,
    cancelled: std::sync::Mutex<Vec<BundleRef>>,
}

impl RecordingCla {
    fn queued(&self) -> Vec<BundleRef> {
        self.queued.lock().unwrap().clone()
    }
}

impl ConvergenceLayer for RecordingCla {
    fn name(&self) -> &str {
        "recording"
    }

    fn bundle_queued(&self, link: &Arc<Link>, bundle: &BundleRef) {
        if !self.hold {
            assert!(link.del_from_queue(bundle));
            assert!(link.add_to_inflight(bundle));
        }
        self.queued.lock().unwrap().push(bundle.clone());
    }

    fn cancel_bundle(&self, _link: &Arc<Link>, bundle: &BundleRef) {
        self.cancelled.lock().unwrap().push(bundle.clone());
    }
}

struct RecordingRegistration {
    endpoint: bpv6::EidPattern,
    delivered: std::sync::Mutex<Vec<bpv6::Bundle>>,
}

impl Registration for RecordingRegistration {
    fn endpoint(&self) -> &bpv6::EidPattern {
        &self.endpoint
    }

    fn deliver(&self, bundle: &bpv6::Bundle) {
        self.delivered.lock().unwrap().push(bundle.clone());
    }
}

/// The daemon with its three stages driven by hand on the test thread.
struct Harness {
    daemon: Arc<Daemon>,
    timers: Arc<ManualTimers>,
    input: InputStage,
    output: OutputStage,
    acs: AcsStage,
}

impl Harness {
    fn new(config: Config, routes: Vec<Route>) -> Self {
        let timers = Arc::new(ManualTimers::default());
        let daemon = Daemon::new(
            config,
            Arc::new(StaticRouter::new(routes, CustodyTimerSpec::default())),
            Arc::new(MemoryStore::default()),
            timers.clone(),
        );
        Self {
            input: InputStage::new(daemon.clone()),
            output: OutputStage::new(daemon.clone()),
            acs: AcsStage::new(daemon.clone()),
            daemon,
            timers,
        }
    }

    fn add_link(&self, name: &str, mtu: u64, cla: Arc<RecordingCla>) -> Arc<Link> {
        let link = Link::new(
            link::Config {
                name: name.into(),
                mtu,
                reliable: true,
            },
            cla,
        );
        assert!(self.daemon.links().add(link.clone()));
        link
    }

    /// Runs every stage until all three queues are empty.
    fn pump(&mut self) {
        loop {
            let mut idle = true;
            while let Some(event) = self.daemon.input.try_recv() {
                idle = false;
                self.input.handle_event(event);
            }
            while let Some(event) = self.daemon.output.try_recv() {
                idle = false;
                self.output.handle_event(event);
            }
            while let Some(event) = self.daemon.acs_queue.try_recv() {
                idle = false;
                self.acs.handle_event(event);
            }
            if idle {
                break;
            }
        }
    }

    fn receive(&mut self, bundle: &bpv6::Bundle, link: &str, prevhop: &str) -> BundleRef {
        let buf = self.daemon.protocol().encode(bundle, link).unwrap();
        let bundle = self
            .daemon
            .receive_bytes(&buf, link, prevhop.parse().unwrap())
            .unwrap();
        self.pump();
        bundle
    }

    /// Reports the whole of `bundle` as sent on `link`.
    fn transmit(&self, bundle: &BundleRef, link: &str) {
        let total = {
            let state = bundle.lock();
            bpv6::BundleProtocol::total_length(&state.bundle, state.xmit_blocks.get(link).unwrap())
                as u64
        };
        self.daemon.bundle_transmitted(bundle, link, total, total, true);
    }

    /// Pending administrative bundles, with their parsed records.
    fn admin_bundles(&self) -> Vec<(bpv6::Bundle, bpv6::AdministrativeRecord)> {
        self.daemon
            .pending()
            .all()
            .into_iter()
            .map(|b| b.snapshot())
            .filter(|b| b.is_admin())
            .map(|b| {
                let record = bpv6::AdministrativeRecord::parse(&b.payload).unwrap();
                (b, record)
            })
            .collect()
    }
}

fn route(pattern: &str, link: &str) -> Route {
    Route {
        pattern: pattern.parse().unwrap(),
        link: link.into(),
    }
}

fn sample(destination: &str, len: usize) -> bpv6::Bundle {
    bpv6::Bundle {
        source: "dtn://src/app".parse().unwrap(),
        destination: destination.parse().unwrap(),
        creation_ts: bpv6::CreationTimestamp::now(1),
        expiration: 3600,
        payload: (0..len).map(|i| i as u8).collect::<Vec<_>>().into(),
        ..Default::default()
    }
}

fn is_expiry(event: &BundleEvent) -> bool {
    matches!(event, BundleEvent::BundleExpired { .. })
}

#[test]
fn duplicate_suppressed() {
    let mut h = Harness::new(Config::default(), Vec::new());
    let bundle = sample("dtn://dst/app", 50);

    let first = h.receive(&bundle, "peer", "dtn://peer");
    let second = h.receive(&bundle, "peer", "dtn://peer");

    assert!(h.daemon.is_pending(&first));
    assert!(!h.daemon.is_pending(&second));
    assert_eq!(h.daemon.pending_len(), 1);
    assert_eq!(h.daemon.stats().duplicate.get(), 1);
    assert_eq!(h.daemon.stats().received.get(), 2);
    assert_eq!(
        first.lock().fwdlog.latest_state("peer"),
        ForwardingState::Received
    );
}

#[test]
fn oversized_bundle_fragmented_for_link() {
    let mut h = Harness::new(Config::default(), vec![route("*", "slow")]);
    let cla = Arc::new(RecordingCla::default());
    h.add_link("slow", 400, cla.clone());

    let original = h.daemon.send(sample("dtn://dst/app", 1000));
    h.pump();

    assert!(!h.daemon.is_pending(&original));
    assert_eq!(
        original.lock().fwdlog.latest_state("slow"),
        ForwardingState::Suppressed
    );

    let mut fragments = cla
        .queued()
        .iter()
        .map(|f| {
            let state = f.lock();
            let blocks = state.xmit_blocks.get("slow").unwrap();
            assert!(bpv6::BundleProtocol::total_length(&state.bundle, blocks) <= 400);
            assert_eq!(state.fwdlog.latest_state("slow"), ForwardingState::Queued);
            (state.bundle.frag_offset, state.bundle.payload.len() as u64)
        })
        .collect::<Vec<_>>();
    fragments.sort();

    assert_eq!(fragments.len(), 3);
    let mut next = 0;
    for (offset, len) in fragments {
        assert_eq!(offset, next);
        next += len;
    }
    assert_eq!(next, 1000);
}

#[test]
fn transmitted_then_redundant_event() {
    let mut h = Harness::new(Config::default(), vec![route("*", "peer")]);
    let cla = Arc::new(RecordingCla::default());
    let link = h.add_link("peer", 0, cla.clone());

    let bundle = h.daemon.send(sample("dtn://dst/app", 100));
    h.pump();
    assert_eq!(cla.queued().len(), 1);
    assert!(link.inflight_contains(&bundle));

    h.transmit(&bundle, "peer");
    // The same report again, which must change nothing
    h.daemon.bundle_transmitted(&bundle, "peer", 1, 1, true);
    h.pump();

    assert_eq!(h.daemon.stats().transmitted.get(), 1);
    assert_eq!(
        bundle.lock().fwdlog.latest_state("peer"),
        ForwardingState::Transmitted
    );
    assert!(!link.inflight_contains(&bundle));
    // Sent, not in custody, so nothing more to do with it
    assert!(!h.daemon.is_pending(&bundle));
}

#[test]
fn partial_send_leaves_tail() {
    let mut h = Harness::new(Config::default(), vec![route("dtn://dst/*", "peer")]);
    let cla = Arc::new(RecordingCla::default());
    h.add_link("peer", 0, cla.clone());

    let bundle = h.daemon.send(sample("dtn://dst/app", 500));
    h.pump();

    let payload_offset = {
        let state = bundle.lock();
        bpv6::BundleProtocol::payload_offset(state.xmit_blocks.get("peer").unwrap()) as u64
    };
    h.daemon
        .bundle_transmitted(&bundle, "peer", payload_offset + 200, payload_offset + 200, true);
    h.pump();

    let queued = cla.queued();
    assert_eq!(queued.len(), 2);
    let tail = queued[1].snapshot();
    assert!(tail.is_fragment);
    assert_eq!(tail.frag_offset, 200);
    assert_eq!(tail.payload.len(), 300);
}

#[test]
fn cancel_queued_bundle() {
    let mut h = Harness::new(Config::default(), vec![route("*", "peer")]);
    let cla = Arc::new(RecordingCla {
        hold: true,
        ..Default::default()
    });
    let link = h.add_link("peer", 0, cla.clone());

    let bundle = h.daemon.send(sample("dtn://dst/app", 100));
    h.pump();
    assert!(link.queue_contains(&bundle));

    h.daemon.request_cancel(&bundle, "peer");
    h.pump();

    assert!(!link.queue_contains(&bundle));
    assert_eq!(link.stats.bundles_cancelled.load(Ordering::Relaxed), 1);
    let state = bundle.lock();
    assert_eq!(state.fwdlog.latest_state("peer"), ForwardingState::Cancelled);
    assert!(!state.xmit_blocks.contains_key("peer"));
}

#[test]
fn cancel_in_flight_goes_to_cla() {
    let mut h = Harness::new(Config::default(), vec![route("*", "peer")]);
    let cla = Arc::new(RecordingCla::default());
    h.add_link("peer", 0, cla.clone());

    let bundle = h.daemon.send(sample("dtn://dst/app", 100));
    h.pump();
    h.daemon.request_cancel(&bundle, "peer");
    h.pump();

    assert_eq!(cla.cancelled.lock().unwrap().len(), 1);

    h.daemon.bundle_transmitted(&bundle, "peer", 0, 0, false);
    h.pump();
    assert_eq!(
        bundle.lock().fwdlog.latest_state("peer"),
        ForwardingState::TransmitFailed
    );
    assert!(h.daemon.is_pending(&bundle));
}

#[test]
fn custody_accepted_with_signal() {
    let mut h = Harness::new(Config::default(), Vec::new());

    let mut bundle = sample("dtn://dst/app", 100);
    bundle.custodian = "dtn://upstream".parse().unwrap();
    bundle.flags.custody_requested = true;
    let received = h.receive(&bundle, "peer", "dtn://upstream");

    {
        let state = received.lock();
        assert!(state.bundle.local_custody);
        assert_eq!(&state.bundle.custodian, h.daemon.local_eid());
    }

    let admin = h.admin_bundles();
    assert_eq!(admin.len(), 1);
    let (signal_bundle, record) = &admin[0];
    assert_eq!(signal_bundle.destination, bundle.custodian);
    let bpv6::AdministrativeRecord::CustodySignal(signal) = record else {
        panic!("Expected a custody signal, got {record}");
    };
    assert!(signal.succeeded);
    assert_eq!(signal.source, bundle.source);
    assert_eq!(signal.creation_ts, bundle.creation_ts);
}

#[test]
fn custody_released_by_signal() {
    let mut h = Harness::new(Config::default(), vec![route("dtn://dst/*", "peer")]);
    let cla = Arc::new(RecordingCla::default());
    h.add_link("peer", 0, cla);

    let mut bundle = sample("dtn://dst/app", 100);
    bundle.flags.custody_requested = true;
    let held = h.daemon.send(bundle);
    h.pump();
    assert!(held.local_custody());

    h.transmit(&held, "peer");
    h.pump();
    // Sent, but kept until the next custodian takes it
    assert!(h.daemon.is_pending(&held));
    assert_eq!(held.lock().custody_timers.len(), 1);

    let signal = bpv6::CustodySignal::create_bundle(
        &held.snapshot(),
        &"dtn://dst".parse().unwrap(),
        true,
        bpv6::CustodyReason::NoAdditionalInfo,
        bpv6::CreationTimestamp::now(0),
    );
    h.receive(&signal, "peer", "dtn://dst");

    assert!(!held.local_custody());
    assert!(!h.daemon.is_pending(&held));
    // The signal was consumed here as well
    assert_eq!(h.daemon.pending_len(), 0);
    assert!(
        h.timers
            .take_all()
            .iter()
            .all(|e| !matches!(e, BundleEvent::CustodyTimeout { .. }))
    );
}

#[test]
fn custody_timeout_reroutes() {
    let mut h = Harness::new(Config::default(), vec![route("dtn://dst/*", "peer")]);
    let cla = Arc::new(RecordingCla::default());
    h.add_link("peer", 0, cla.clone());

    let mut bundle = sample("dtn://dst/app", 100);
    bundle.flags.custody_requested = true;
    let held = h.daemon.send(bundle);
    h.pump();
    h.transmit(&held, "peer");
    h.pump();

    assert_eq!(
        h.timers
            .fire_where(|e| matches!(e, BundleEvent::CustodyTimeout { .. })),
        1
    );
    h.pump();

    // Queued again after the timeout
    assert_eq!(cla.queued().len(), 2);
    assert_eq!(
        held.lock().fwdlog.latest_state("peer"),
        ForwardingState::Queued
    );
}

#[test]
fn expired_bundle_deleted() {
    let mut h = Harness::new(Config::default(), Vec::new());
    let bundle = h.daemon.send(sample("dtn://dst/app", 10));
    h.pump();
    assert!(h.daemon.is_pending(&bundle));

    assert_eq!(h.timers.fire_where(is_expiry), 1);
    h.pump();

    assert!(!h.daemon.is_pending(&bundle));
    assert_eq!(h.daemon.stats().expired.get(), 1);
    assert_eq!(h.daemon.stats().deleted.get(), 1);
}

#[test]
fn already_expired_never_pending() {
    let mut h = Harness::new(Config::default(), Vec::new());
    let mut bundle = sample("dtn://dst/app", 10);
    bundle.creation_ts = bpv6::CreationTimestamp::new(1000, 0);
    bundle.expiration = 60;

    let received = h.receive(&bundle, "peer", "dtn://peer");
    assert!(!h.daemon.is_pending(&received));
    assert_eq!(h.daemon.stats().expired.get(), 1);
}

#[test]
fn aggregate_custody_round_trip() {
    let mut h = Harness::new(Config::default(), Vec::new());

    // An upstream custodian that tagged its bundles with custody ids
    let upstream: bpv6::Eid = "dtn://upstream".parse().unwrap();
    for (seqno, custody_id) in [(1, 42), (2, 43)] {
        let mut bundle = sample("dtn://dst/app", 20);
        bundle.creation_ts = bpv6::CreationTimestamp::now(seqno);
        bundle.custodian = upstream.clone();
        bundle.local_custody = true;
        bundle.custody_id = custody_id;
        bundle.flags.custody_requested = true;
        h.receive(&bundle, "peer", "dtn://upstream");
    }

    // Held open until the delay passes
    assert!(h.admin_bundles().is_empty());
    assert_eq!(
        h.daemon
            .acs()
            .pending_runs(&acs::pending_key(
                &upstream,
                true,
                bpv6::CustodyReason::NoAdditionalInfo
            )),
        vec![(42, 2)]
    );

    assert_eq!(
        h.timers
            .fire_where(|e| matches!(e, BundleEvent::AcsExpired { .. })),
        1
    );
    h.pump();

    let admin = h.admin_bundles();
    assert_eq!(admin.len(), 1);
    let (acs_bundle, record) = &admin[0];
    assert_eq!(acs_bundle.destination, upstream);
    let bpv6::AdministrativeRecord::AggregateCustodySignal(signal) = record else {
        panic!("Expected an aggregate custody signal, got {record}");
    };
    assert!(signal.succeeded);
    assert_eq!(signal.custody_ids().collect::<Vec<_>>(), vec![42, 43]);
    assert_eq!(h.daemon.stats().acs_generated.get(), 1);
}

#[test]
fn aggregate_custody_releases() {
    let mut h = Harness::new(Config::default(), vec![route("dtn://dst/*", "peer")]);
    h.add_link("peer", 0, Arc::new(RecordingCla::default()));

    let held = (0..3)
        .map(|seqno| {
            let mut bundle = sample("dtn://dst/app", 20);
            bundle.creation_ts = bpv6::CreationTimestamp::now(seqno);
            bundle.flags.custody_requested = true;
            h.daemon.send(bundle)
        })
        .collect::<Vec<_>>();
    h.pump();
    for bundle in &held {
        h.transmit(bundle, "peer");
    }
    h.pump();

    let ids = held
        .iter()
        .map(|b| b.lock().bundle.custody_id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![1, 2, 3]);

    // Acknowledges the first two, and one never issued
    let record = bpv6::AggregateCustodySignal {
        succeeded: true,
        reason: bpv6::CustodyReason::NoAdditionalInfo,
        fills: vec![
            bpv6::AcsFill {
                start: 1,
                length: 2,
            },
            bpv6::AcsFill {
                start: 9,
                length: 1,
            },
        ],
    };
    let signal = record.create_bundle(
        h.daemon.local_eid(),
        &"dtn://dst".parse().unwrap(),
        bpv6::CreationTimestamp::now(0),
        3600,
    );
    h.receive(&signal, "peer", "dtn://dst");

    assert!(!h.daemon.is_pending(&held[0]));
    assert!(!h.daemon.is_pending(&held[1]));
    assert!(h.daemon.is_pending(&held[2]));
    assert!(held[2].local_custody());
    assert_eq!(h.daemon.stats().acs_released.get(), 2);
    assert_eq!(h.daemon.stats().acs_invalid.get(), 1);
}

#[test]
fn fragments_reassembled_and_delivered() {
    let config = Config::default();
    let registration = Arc::new(RecordingRegistration {
        endpoint: "dtn://local/app".parse().unwrap(),
        delivered: Default::default(),
    });
    let mut h = Harness::new(config, Vec::new());
    h.daemon.registrations().add(registration.clone());

    let whole = sample("dtn://local/app", 600);
    let mut fragments =
        fragment::proactively_fragment(h.daemon.protocol(), &whole, "peer", 250).unwrap();
    assert!(fragments.len() > 2);
    fragments.reverse();

    for f in &fragments {
        h.receive(f, "peer", "dtn://peer");
        assert!(registration.delivered.lock().unwrap().is_empty() || f.frag_offset == 0);
    }

    let delivered = registration.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert!(!delivered[0].is_fragment);
    assert_eq!(delivered[0].payload, whole.payload);
    assert_eq!(h.daemon.stats().delivered.get(), 1);
}

#[test]
fn oversized_fragment_deleted() {
    let config = Config {
        max_reassembly_length: 1000,
        ..Default::default()
    };
    let registration = Arc::new(RecordingRegistration {
        endpoint: "dtn://local/app".parse().unwrap(),
        delivered: Default::default(),
    });
    let mut h = Harness::new(config, Vec::new());
    h.daemon.registrations().add(registration.clone());

    let whole = sample("dtn://local/app", 40);
    let mut huge = fragment::create_fragment(&whole, 0, 4, true, false);
    huge.orig_length = u64::MAX;
    let huge = h.receive(&huge, "peer", "dtn://peer");
    assert!(!h.daemon.is_pending(&huge));
    assert_eq!(h.daemon.stats().deleted.get(), 1);

    let mut large = fragment::create_fragment(&whole, 0, 4, true, false);
    large.orig_length = 2000;
    let large = h.receive(&large, "peer", "dtn://peer");
    assert!(!h.daemon.is_pending(&large));
    assert_eq!(h.daemon.stats().deleted.get(), 2);

    // The input stage carries on with the next bundle
    h.receive(&whole, "peer", "dtn://peer");
    let delivered = registration.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].payload, whole.payload);
}

#[test]
fn stages_run_on_threads() {
    let timers = Arc::new(ManualTimers::default());
    let config = Config {
        event_wait_ms: 10,
        ..Default::default()
    };
    let daemon = Daemon::new(
        config,
        Arc::new(StaticRouter::default()),
        Arc::new(MemoryStore::default()),
        timers,
    );
    daemon.start().unwrap();

    let bundle = daemon.send(sample("dtn://dst/app", 10));
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while !daemon.is_pending(&bundle) && std::time::Instant::now() < deadline {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert!(daemon.is_pending(&bundle));

    daemon.shutdown();
}

/*!
Aggregate custody signal accumulation.

Custody ids waiting to be acknowledged to the same custodian with the same
status are collected into runs, and sent as one signal when the signal grows
past its size limit or has been held open for its delay.
*/

use super::*;
use bundle::{BundleRef, BundleState};
use event::BundleEvent;
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use timer::Timers;

mod params;
mod pending;

pub use params::{AcsParams, RouteConfig, RouteParams};
pub use pending::{AcsEntry, Changes, PendingAcs};

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub defaults: AcsParams,
    pub routes: Vec<RouteConfig>,
}

/// The key of the pending signal for one custodian and status.
pub fn pending_key(custodian: &bpv6::Eid, succeeded: bool, reason: bpv6::CustodyReason) -> String {
    format!(
        "{custodian}~{}~{:02x}",
        if succeeded { "success" } else { "fail" },
        u8::from(reason)
    )
}

/// A signal ready to go.
#[derive(Debug)]
pub struct Flushed {
    pub custodian: bpv6::Eid,
    pub signal: bpv6::AggregateCustodySignal,
}

pub struct Acs {
    params: std::sync::Mutex<RouteParams>,
    pending: std::sync::Mutex<HashMap<String, PendingAcs>>,
    custody_ids: spin::Mutex<HashMap<u64, BundleRef>>,
    next_custody_id: AtomicU64,
    next_pacs_id: AtomicU64,
    timers: Arc<dyn Timers>,
    /// Where expiry events go.
    queue: EventQueue,
}

impl Acs {
    pub fn new(config: &Config, timers: Arc<dyn Timers>, queue: EventQueue) -> Self {
        Self {
            params: std::sync::Mutex::new(RouteParams::new(
                config.defaults,
                config.routes.clone(),
            )),
            pending: std::sync::Mutex::new(HashMap::new()),
            custody_ids: spin::Mutex::new(HashMap::new()),
            next_custody_id: AtomicU64::new(1),
            next_pacs_id: AtomicU64::new(1),
            timers,
            queue,
        }
    }

    fn params(&self) -> std::sync::MutexGuard<'_, RouteParams> {
        self.params.lock().trace_expect("ACS params lock poisoned")
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingAcs>> {
        self.pending.lock().trace_expect("ACS pending lock poisoned")
    }

    pub fn set_route(&self, pattern: bpv6::EidPattern, params: AcsParams) {
        self.params().set(pattern, params)
    }

    pub fn delete_route(&self, pattern: &bpv6::EidPattern) -> bool {
        self.params().delete(pattern)
    }

    pub fn enabled_for(&self, eid: &bpv6::Eid) -> bool {
        self.params().lookup(eid).enabled
    }

    /// Assigns a custody id to a bundle this node has just taken custody of,
    /// if its next custodian may aggregate signals.
    pub fn accept_custody(&self, bundle: &BundleRef, state: &mut BundleState) {
        if !self.enabled_for(&state.bundle.destination) {
            return;
        }
        let id = self.next_custody_id.fetch_add(1, Ordering::Relaxed);
        state.bundle.custody_id = id;
        self.custody_ids.lock().insert(id, bundle.clone());
        trace!("Custody id {id} assigned to {bundle}");
    }

    /// Records a custody id assigned before a restart.
    pub fn add_custody_id(&self, id: u64, bundle: &BundleRef) {
        self.next_custody_id.fetch_max(id + 1, Ordering::Relaxed);
        self.custody_ids.lock().insert(id, bundle.clone());
    }

    pub fn erase_custody_id(&self, id: u64) -> Option<BundleRef> {
        self.custody_ids.lock().remove(&id)
    }

    pub fn find_custody_id(&self, id: u64) -> Option<BundleRef> {
        self.custody_ids.lock().get(&id).cloned()
    }

    /// The most recently issued custody id, 0 if none.
    pub fn last_custody_id(&self) -> u64 {
        self.next_custody_id.load(Ordering::Relaxed) - 1
    }

    fn next_pacs_id(&self) -> u64 {
        self.next_pacs_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds a custody id to the pending signal for `custodian`, returning a
    /// signal that must be sent first if adding it overflowed the old one.
    #[cfg_attr(feature = "instrument", instrument(skip(self)))]
    pub fn add(
        &self,
        custodian: &bpv6::Eid,
        custody_id: u64,
        succeeded: bool,
        reason: bpv6::CustodyReason,
    ) -> Option<Flushed> {
        let key = pending_key(custodian, succeeded, reason);
        let mut pending = self.pending();
        let pacs = pending.entry(key.clone()).or_insert_with(|| {
            PendingAcs::new(self.next_pacs_id(), custodian.clone(), succeeded, reason)
        });

        let Some(mut changes) = pacs.plan(custody_id) else {
            debug!("Custody id {custody_id} already pending for {key}");
            return None;
        };
        let delta = pacs.delta(&changes);

        let mut delay_decreased = false;
        {
            let params = self.params();
            if pacs.params_revision != params.revision() {
                let resolved = params.lookup(custodian);
                delay_decreased = pacs.params_revision != 0 && resolved.delay < pacs.params.delay;
                pacs.params = resolved;
                pacs.params_revision = params.revision();
            }
        }

        let payload = pacs.payload_length() as isize;
        let size = pacs.params.size as isize;
        let mut flushed = None;
        if payload > 0 && ((size > 0 && payload + delta > size) || delay_decreased) {
            flushed = self.flush(pacs);
            changes = pacs
                .plan(custody_id)
                .trace_expect("Custody id rejected by an empty signal");
        }

        let first = pacs.is_empty();
        pacs.apply(changes);
        if first {
            pacs.timer = Some(self.timers.schedule_in(
                std::time::Duration::from_secs(pacs.params.delay),
                &self.queue,
                BundleEvent::AcsExpired {
                    key,
                    pacs_id: pacs.pacs_id,
                },
            ));
        }
        flushed
    }

    fn flush(&self, pacs: &mut PendingAcs) -> Option<Flushed> {
        if let Some(timer) = pacs.timer.take() {
            self.timers.cancel(timer);
        }
        let flushed = (pacs.payload_length() > 0).then(|| Flushed {
            custodian: pacs.custodian.clone(),
            signal: pacs.to_signal(),
        });
        pacs.reset(self.next_pacs_id());
        flushed
    }

    /// Handles the expiry timer of a pending signal. An expiry for a signal
    /// that has since been flushed is ignored.
    pub fn expire(&self, key: &str, pacs_id: u64) -> Option<Flushed> {
        let mut pending = self.pending();
        let Some(pacs) = pending.get_mut(key) else {
            info!("ACS expiry for unknown signal {key}");
            return None;
        };
        if pacs.pacs_id != pacs_id {
            info!(
                "ACS expiry for {key} ignored: signal {pacs_id} was sent before timeout, now {}",
                pacs.pacs_id
            );
            return None;
        }
        pacs.timer = None;
        self.flush(pacs)
    }

    /// The runs pending for `key`.
    pub fn pending_runs(&self, key: &str) -> Vec<(u64, u64)> {
        self.pending()
            .get(key)
            .map(|p| p.runs().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timer::ManualTimers;

    fn acs(size: u64) -> (Acs, Arc<ManualTimers>) {
        let timers = Arc::new(ManualTimers::default());
        let config = Config {
            defaults: AcsParams {
                enabled: true,
                delay: 30,
                size,
            },
            routes: Vec::new(),
        };
        (Acs::new(&config, timers.clone(), EventQueue::new()), timers)
    }

    fn custodian() -> bpv6::Eid {
        "dtn://peer".parse().unwrap()
    }

    const OK: bpv6::CustodyReason = bpv6::CustodyReason::NoAdditionalInfo;

    #[test]
    fn key_format() {
        assert_eq!(
            pending_key(&custodian(), true, OK),
            "dtn://peer~success~00"
        );
        assert_eq!(
            pending_key(&custodian(), false, bpv6::CustodyReason::RedundantReception),
            "dtn://peer~fail~03"
        );
    }

    #[test]
    fn size_trigger_flushes_once() {
        // Singleton runs encode to two bytes each
        let (acs, timers) = acs(4);
        let key = pending_key(&custodian(), true, OK);

        assert!(acs.add(&custodian(), 1, true, OK).is_none());
        assert_eq!(timers.len(), 1);
        assert!(acs.add(&custodian(), 3, true, OK).is_none());

        let flushed = acs.add(&custodian(), 5, true, OK).unwrap();
        assert_eq!(flushed.custodian, custodian());
        assert_eq!(
            flushed.signal.custody_ids().collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(acs.pending_runs(&key), vec![(5, 1)]);

        // The old timer went with the flushed signal
        assert_eq!(timers.len(), 1);

        assert!(acs.add(&custodian(), 6, true, OK).is_none());
        assert_eq!(acs.pending_runs(&key), vec![(5, 2)]);
    }

    #[test]
    fn stale_expiry_ignored() {
        let (acs, timers) = acs(4);
        let key = pending_key(&custodian(), true, OK);

        acs.add(&custodian(), 1, true, OK);
        let stale = timers.take_all();
        acs.add(&custodian(), 3, true, OK);
        acs.add(&custodian(), 5, true, OK).unwrap();

        let BundleEvent::AcsExpired { key: k, pacs_id } = &stale[0] else {
            panic!("Expected an ACS expiry");
        };
        assert_eq!(k, &key);
        assert!(acs.expire(&key, *pacs_id).is_none());
        assert_eq!(acs.pending_runs(&key), vec![(5, 1)]);

        let current = timers.take_all();
        let BundleEvent::AcsExpired { pacs_id, .. } = &current[0] else {
            panic!("Expected an ACS expiry");
        };
        let flushed = acs.expire(&key, *pacs_id).unwrap();
        assert_eq!(flushed.signal.custody_ids().collect::<Vec<_>>(), vec![5]);
        assert!(acs.pending_runs(&key).is_empty());
        assert!(acs.expire("dtn://nobody~success~00", 1).is_none());
    }

    #[test]
    fn statuses_kept_apart() {
        let (acs, _timers) = acs(0);
        acs.add(&custodian(), 1, true, OK);
        acs.add(&custodian(), 2, false, bpv6::CustodyReason::DepletedStorage);
        acs.add(&custodian(), 2, true, OK);
        assert!(acs.add(&custodian(), 2, true, OK).is_none());

        assert_eq!(
            acs.pending_runs(&pending_key(&custodian(), true, OK)),
            vec![(1, 2)]
        );
        assert_eq!(
            acs.pending_runs(&pending_key(
                &custodian(),
                false,
                bpv6::CustodyReason::DepletedStorage
            )),
            vec![(2, 1)]
        );
    }

    #[test]
    fn shorter_delay_flushes() {
        let (acs, _timers) = acs(0);
        acs.add(&custodian(), 1, true, OK);
        acs.set_route(
            "dtn://peer".parse().unwrap(),
            AcsParams {
                enabled: true,
                delay: 5,
                size: 0,
            },
        );
        let flushed = acs.add(&custodian(), 2, true, OK).unwrap();
        assert_eq!(flushed.signal.custody_ids().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn custody_ids() {
        let (acs, _timers) = acs(0);
        let bundle = bundle::Bundle::new(
            1,
            bpv6::Bundle {
                destination: "dtn://dst".parse().unwrap(),
                ..Default::default()
            },
        );
        assert_eq!(acs.last_custody_id(), 0);
        {
            let mut state = bundle.lock();
            acs.accept_custody(&bundle, &mut state);
            assert_eq!(state.bundle.custody_id, 1);
        }
        assert_eq!(acs.last_custody_id(), 1);
        assert!(acs.find_custody_id(1).is_some());

        acs.add_custody_id(7, &bundle);
        assert_eq!(acs.last_custody_id(), 7);
        assert!(acs.erase_custody_id(1).is_some());
        assert!(acs.find_custody_id(1).is_none());

        acs.set_route(
            "dtn://dst".parse().unwrap(),
            AcsParams {
                enabled: false,
                ..Default::default()
            },
        );
        let mut state = bundle.lock();
        state.bundle.custody_id = 0;
        acs.accept_custody(&bundle, &mut state);
        assert_eq!(state.bundle.custody_id, 0);
    }
}

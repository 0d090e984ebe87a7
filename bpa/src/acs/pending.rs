use super::*;
use std::collections::BTreeMap;

/// One run of custody ids, keyed in [`PendingAcs`] by its left edge.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AcsEntry {
    pub length_of_fill: u64,
    pub diff_to_prev_right_edge: u64,
    /// The encoded size of this entry's two SDNVs.
    pub sdnv_length: usize,
}

impl AcsEntry {
    fn new(length_of_fill: u64, diff_to_prev_right_edge: u64) -> Self {
        Self {
            length_of_fill,
            diff_to_prev_right_edge,
            sdnv_length: hardy_sdnv::encoding_len(diff_to_prev_right_edge)
                + hardy_sdnv::encoding_len(length_of_fill),
        }
    }

    fn right_edge(&self, left_edge: u64) -> u64 {
        left_edge + self.length_of_fill - 1
    }
}

/// The entries an insertion removes and (re)writes, worked out before
/// anything is changed.
#[derive(Debug, Default)]
pub struct Changes {
    erase: Vec<u64>,
    write: Vec<(u64, AcsEntry)>,
}

/// The custody ids waiting to be signalled to one custodian with one
/// succeeded/reason status.
#[derive(Debug)]
pub struct PendingAcs {
    /// Changes whenever the signal is flushed, so that a stale expiry can be
    /// recognised.
    pub pacs_id: u64,
    pub custodian: bpv6::Eid,
    pub succeeded: bool,
    pub reason: bpv6::CustodyReason,
    entries: BTreeMap<u64, AcsEntry>,
    payload_length: usize,
    num_custody_ids: u64,
    /// The route parameter revision `params` was resolved against.
    pub params_revision: u64,
    pub params: AcsParams,
    pub timer: Option<timer::TimerId>,
}

impl PendingAcs {
    pub fn new(
        pacs_id: u64,
        custodian: bpv6::Eid,
        succeeded: bool,
        reason: bpv6::CustodyReason,
    ) -> Self {
        Self {
            pacs_id,
            custodian,
            succeeded,
            reason,
            entries: BTreeMap::new(),
            payload_length: 0,
            num_custody_ids: 0,
            params_revision: 0,
            params: AcsParams::default(),
            timer: None,
        }
    }

    pub fn payload_length(&self) -> usize {
        self.payload_length
    }

    pub fn num_custody_ids(&self) -> u64 {
        self.num_custody_ids
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The runs as `(left_edge, length_of_fill)` pairs, in order.
    pub fn runs(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.entries.iter().map(|(l, e)| (*l, e.length_of_fill))
    }

    pub fn entries(&self) -> impl Iterator<Item = (&u64, &AcsEntry)> {
        self.entries.iter()
    }

    /// Works out how adding `id` changes the runs. Returns `None` if `id` is
    /// already covered.
    pub fn plan(&self, id: u64) -> Option<Changes> {
        // 0 is never a custody id
        if id == 0 {
            return None;
        }
        let mut changes = Changes::default();

        let prev = self.entries.range(..id).next_back().map(|(l, e)| (*l, *e));
        let next = self.entries.range(id..).next().map(|(l, e)| (*l, *e));

        if prev.is_some_and(|(l, e)| id <= e.right_edge(l)) {
            return None;
        }
        let prev_right = prev.map(|(l, e)| e.right_edge(l));

        match next {
            Some((left, _)) if left == id => return None,
            None => match prev {
                None => changes.write.push((id, AcsEntry::new(1, id))),
                Some((l, e)) if id == e.right_edge(l) + 1 => changes
                    .write
                    .push((l, AcsEntry::new(e.length_of_fill + 1, e.diff_to_prev_right_edge))),
                Some((l, e)) => changes
                    .write
                    .push((id, AcsEntry::new(1, id - e.right_edge(l)))),
            },
            Some((left, entry)) if id + 1 == left => match prev {
                Some((l, e)) if prev_right == Some(id - 1) => {
                    // Bridges the gap between two runs
                    changes.erase.push(left);
                    changes.write.push((
                        l,
                        AcsEntry::new(
                            e.length_of_fill + 1 + entry.length_of_fill,
                            e.diff_to_prev_right_edge,
                        ),
                    ));
                }
                _ => {
                    changes.erase.push(left);
                    changes.write.push((
                        id,
                        AcsEntry::new(entry.length_of_fill + 1, entry.diff_to_prev_right_edge - 1),
                    ));
                }
            },
            Some((left, entry)) => {
                match prev {
                    Some((l, e)) if prev_right == Some(id - 1) => changes
                        .write
                        .push((l, AcsEntry::new(e.length_of_fill + 1, e.diff_to_prev_right_edge))),
                    _ => changes
                        .write
                        .push((id, AcsEntry::new(1, id - prev_right.unwrap_or(0)))),
                }
                changes.write.push((
                    left,
                    AcsEntry::new(entry.length_of_fill, left - id),
                ));
            }
        }
        Some(changes)
    }

    /// The change in encoded payload length `changes` would make.
    pub fn delta(&self, changes: &Changes) -> isize {
        let removed = changes
            .erase
            .iter()
            .chain(changes.write.iter().map(|(l, _)| l))
            .filter_map(|l| self.entries.get(l))
            .map(|e| e.sdnv_length as isize)
            .sum::<isize>();
        let added = changes
            .write
            .iter()
            .map(|(_, e)| e.sdnv_length as isize)
            .sum::<isize>();
        added - removed
    }

    pub fn apply(&mut self, changes: Changes) {
        let delta = self.delta(&changes);
        for left in changes.erase {
            self.entries.remove(&left);
        }
        for (left, entry) in changes.write {
            self.entries.insert(left, entry);
        }
        self.payload_length = (self.payload_length as isize + delta) as usize;
        self.num_custody_ids += 1;
    }

    /// Adds `id` directly, returning false if it was already covered.
    pub fn insert(&mut self, id: u64) -> bool {
        match self.plan(id) {
            Some(changes) => {
                self.apply(changes);
                true
            }
            None => false,
        }
    }

    /// The signal covering every pending id.
    pub fn to_signal(&self) -> bpv6::AggregateCustodySignal {
        bpv6::AggregateCustodySignal {
            succeeded: self.succeeded,
            reason: self.reason,
            fills: self
                .runs()
                .map(|(start, length)| bpv6::AcsFill { start, length })
                .collect(),
        }
    }

    /// Empties the pending runs and moves on to `pacs_id`.
    pub fn reset(&mut self, pacs_id: u64) {
        self.entries.clear();
        self.payload_length = 0;
        self.num_custody_ids = 0;
        self.pacs_id = pacs_id;
        self.timer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> PendingAcs {
        PendingAcs::new(
            1,
            "dtn://peer".parse().unwrap(),
            true,
            bpv6::CustodyReason::NoAdditionalInfo,
        )
    }

    fn check_consistent(pacs: &PendingAcs) {
        let mut prev_right = 0;
        let mut payload = 0;
        for (left, entry) in pacs.entries() {
            assert_eq!(entry.diff_to_prev_right_edge, left - prev_right);
            assert_eq!(
                entry.sdnv_length,
                hardy_sdnv::encoding_len(entry.diff_to_prev_right_edge)
                    + hardy_sdnv::encoding_len(entry.length_of_fill)
            );
            payload += entry.sdnv_length;
            prev_right = left + entry.length_of_fill - 1;
        }
        assert_eq!(pacs.payload_length(), payload);
        assert_eq!(pacs.to_signal().fills_len(), payload);
    }

    #[test]
    fn runs_and_merge() {
        let mut pacs = pending();
        for id in [5, 6, 7, 10, 11, 4] {
            assert!(pacs.insert(id));
            check_consistent(&pacs);
        }
        assert_eq!(pacs.runs().collect::<Vec<_>>(), vec![(4, 4), (10, 2)]);
        assert_eq!(pacs.num_custody_ids(), 6);

        // 9 extends the second run down; 8 then bridges the two
        assert!(pacs.insert(9));
        assert_eq!(pacs.runs().collect::<Vec<_>>(), vec![(4, 4), (9, 3)]);
        let before = pacs.payload_length();

        let changes = pacs.plan(8).unwrap();
        assert!(pacs.delta(&changes) < 0);
        pacs.apply(changes);
        check_consistent(&pacs);
        assert_eq!(pacs.runs().collect::<Vec<_>>(), vec![(4, 8)]);
        assert!(pacs.payload_length() < before);
        assert_eq!(pacs.num_custody_ids(), 8);
    }

    #[test]
    fn between_runs() {
        let mut pacs = pending();
        for id in [1, 2, 20, 21] {
            pacs.insert(id);
        }

        // Extends the earlier run, shrinking the gap to the next
        assert!(pacs.insert(3));
        check_consistent(&pacs);
        assert_eq!(pacs.runs().collect::<Vec<_>>(), vec![(1, 3), (20, 2)]);

        // Touches neither run
        assert!(pacs.insert(10));
        check_consistent(&pacs);
        assert_eq!(
            pacs.runs().collect::<Vec<_>>(),
            vec![(1, 3), (10, 1), (20, 2)]
        );

        // Prepends to the first run with no run before it
        let mut pacs = pending();
        pacs.insert(3);
        assert!(pacs.insert(2));
        assert!(pacs.insert(1));
        check_consistent(&pacs);
        assert_eq!(pacs.runs().collect::<Vec<_>>(), vec![(1, 3)]);
    }

    #[test]
    fn duplicates() {
        let mut pacs = pending();
        for id in [5, 6, 7] {
            pacs.insert(id);
        }
        assert!(pacs.plan(5).is_none());
        assert!(pacs.plan(6).is_none());
        assert!(pacs.plan(7).is_none());
        assert!(!pacs.insert(6));
        assert_eq!(pacs.num_custody_ids(), 3);
    }

    #[test]
    fn large_gaps() {
        let mut pacs = pending();
        pacs.insert(1);
        pacs.insert(1_000_000);
        pacs.insert(500);
        check_consistent(&pacs);
        assert_eq!(
            pacs.runs().collect::<Vec<_>>(),
            vec![(1, 1), (500, 1), (1_000_000, 1)]
        );

        pacs.reset(2);
        assert!(pacs.is_empty());
        assert_eq!(pacs.payload_length(), 0);
        assert_eq!(pacs.pacs_id, 2);
    }
}

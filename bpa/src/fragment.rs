/*!
Fragmentation and reassembly.

Fragments are created proactively when a bundle is larger than a link's MTU,
reactively when a send stops part way through, and by conversion when a
bundle arrives short. Fragments addressed to this node are collected by the
[`FragmentManager`] until the whole payload is covered.
*/

use super::*;
use bpv6::{BlockInfo, BlockType, BundleProtocol};
use bundle::BundleRef;
use hashbrown::HashMap;
use thiserror::Error;

/// Largest original payload reassembled unless configured otherwise.
pub const DEFAULT_MAX_REASSEMBLY_LENGTH: u64 = 64 * 1024 * 1024;

/// Why a fragment was refused for reassembly.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("Fragment offset {offset} plus length {length} overflows")]
    ExtentOverflow { offset: u64, length: u64 },

    #[error("Fragment ends at {end}, past its original length {orig_length}")]
    PastEnd { end: u64, orig_length: u64 },

    #[error("Original length {length} exceeds the reassembly limit of {limit}")]
    TooLong { length: u64, limit: u64 },

    #[error("Original length {length} disagrees with {expected} from earlier fragments")]
    LengthDisagrees { length: u64, expected: u64 },
}

impl ReassemblyError {
    /// The status report reason for deleting the refused fragment.
    pub fn reason(&self) -> bpv6::ReasonCode {
        match self {
            ReassemblyError::TooLong { .. } => bpv6::ReasonCode::DepletedStorage,
            _ => bpv6::ReasonCode::BlockUnintelligible,
        }
    }
}

/// The reassembly key: creation timestamp, source and destination.
pub fn fragment_key(bundle: &bpv6::Bundle) -> String {
    format!(
        "{}.{}{}{}",
        bundle.creation_ts.seconds, bundle.creation_ts.seqno, bundle.source, bundle.destination
    )
}

fn payload_index(blocks: &[BlockInfo]) -> Option<usize> {
    blocks.iter().position(|b| b.block_type == BlockType::Payload)
}

/// Creates a fragment holding `length` bytes of `bundle`'s payload starting
/// at `offset`.
///
/// Blocks before the payload go only in the first fragment, blocks after it
/// only in the last, and blocks flagged for replication in every fragment.
/// A fragment never carries local custody: the caller takes custody of it
/// afresh.
pub fn create_fragment(
    bundle: &bpv6::Bundle,
    offset: usize,
    length: usize,
    first: bool,
    last: bool,
) -> bpv6::Bundle {
    let payload = payload_index(&bundle.recv_blocks);
    let recv_blocks = bundle
        .recv_blocks
        .iter()
        .enumerate()
        .filter(|(idx, block)| match payload {
            Some(p) if *idx == p => true,
            _ if block.flags.must_replicate => true,
            Some(p) if *idx < p => first,
            Some(_) => last,
            None => first,
        })
        .map(|(_, block)| block.clone())
        .collect();

    let mut flags = bundle.flags;
    flags.do_not_fragment = false;

    bpv6::Bundle {
        source: bundle.source.clone(),
        destination: bundle.destination.clone(),
        replyto: bundle.replyto.clone(),
        custodian: if bundle.local_custody {
            bpv6::Eid::null()
        } else {
            bundle.custodian.clone()
        },
        prevhop: bundle.prevhop.clone(),
        creation_ts: bundle.creation_ts,
        expiration: bundle.expiration,
        flags,
        is_fragment: true,
        frag_offset: if bundle.is_fragment {
            bundle.frag_offset + offset as u64
        } else {
            offset as u64
        },
        orig_length: bundle.adu_length(),
        payload: bundle.payload.slice(offset..offset + length),
        recv_blocks,
        api_blocks: bundle.api_blocks.clone(),
        generated_metadata: bundle.generated_metadata.clone(),
        local_custody: false,
        custody_id: 0,
    }
}

fn encoded_length(protocol: &BundleProtocol, bundle: &bpv6::Bundle, link: &str) -> Option<usize> {
    let mut blocks = protocol.prepare_blocks(bundle, link);
    match protocol.generate_blocks(bundle, &mut blocks, link) {
        Ok(()) => Some(BundleProtocol::total_length(bundle, &blocks)),
        Err(e) => {
            warn!("Failed to generate fragment blocks: {e}");
            None
        }
    }
}

/// Splits `bundle` into fragments that each encode to at most `max_length`
/// bytes on `link`.
///
/// Returns `None` if the bundle must not be fragmented, or if the blocks
/// that accompany the payload leave no room for it.
pub fn proactively_fragment(
    protocol: &BundleProtocol,
    bundle: &bpv6::Bundle,
    link: &str,
    max_length: usize,
) -> Option<Vec<bpv6::Bundle>> {
    if bundle.flags.do_not_fragment {
        debug!("Bundle {} is flagged do not fragment", bundle.id());
        return None;
    }

    let len = bundle.payload.len();
    if len <= 1 {
        debug!("Bundle {} payload too short to fragment", bundle.id());
        return None;
    }

    let first_overhead = encoded_length(protocol, &create_fragment(bundle, 0, 0, true, false), link)?;
    let last_overhead = encoded_length(protocol, &create_fragment(bundle, len, 0, false, true), link)?;
    if first_overhead >= max_length || last_overhead >= max_length {
        warn!(
            "Cannot fragment bundle {} for {max_length} bytes: {first_overhead} and {last_overhead} bytes of blocks",
            bundle.id()
        );
        return None;
    }

    let mut fragments = Vec::new();
    let mut offset = 0;
    while offset < len {
        let first = offset == 0;
        let remaining = len - offset;

        let tail = create_fragment(bundle, offset, remaining, first, true);
        if encoded_length(protocol, &tail, link)? <= max_length {
            fragments.push(tail);
            break;
        }

        // Leave at least a byte for the last fragment
        let overhead = encoded_length(protocol, &create_fragment(bundle, offset, 0, first, false), link)?;
        let mut frag_len = max_length.saturating_sub(overhead).min(remaining - 1);
        loop {
            if frag_len == 0 {
                warn!("Cannot fit a fragment of bundle {} into {max_length} bytes", bundle.id());
                return None;
            }
            let fragment = create_fragment(bundle, offset, frag_len, first, false);
            if encoded_length(protocol, &fragment, link)? <= max_length {
                fragments.push(fragment);
                offset += frag_len;
                break;
            }
            frag_len -= 1;
        }
    }

    debug!(
        "Fragmented bundle {} into {} fragments for {max_length} bytes",
        bundle.id(),
        fragments.len()
    );
    Some(fragments)
}

/// After a send that stopped at `bytes_sent`, creates a fragment holding the
/// payload that did not get through.
pub fn try_to_reactively_fragment(
    bundle: &bpv6::Bundle,
    xmit_blocks: &[BlockInfo],
    bytes_sent: u64,
) -> Option<bpv6::Bundle> {
    if bundle.flags.do_not_fragment {
        return None;
    }

    let total_length = BundleProtocol::total_length(bundle, xmit_blocks) as u64;
    let payload_offset = BundleProtocol::payload_offset(xmit_blocks) as u64;
    if bytes_sent <= payload_offset || bytes_sent >= total_length {
        return None;
    }

    let len = bundle.payload.len();
    if len <= 1 {
        return None;
    }

    let payload_sent = len.min((bytes_sent - payload_offset) as usize);
    let (offset, tail) = if payload_sent == len {
        // Only trailing blocks were lost, resend the last byte with them
        (len - 1, 1)
    } else {
        (payload_sent, len - payload_sent)
    };

    debug!(
        "Reactively fragmenting bundle {}: {bytes_sent}/{total_length} bytes sent, {tail} payload bytes remain",
        bundle.id()
    );
    Some(create_fragment(bundle, offset, tail, false, true))
}

/// Turns a bundle whose payload arrived short into a fragment of the part
/// that was received. Returns false if the bundle cannot be converted, or
/// arrived whole.
pub fn try_to_convert_to_fragment(bundle: &mut bpv6::Bundle) -> bool {
    let Some(idx) = payload_index(&bundle.recv_blocks) else {
        return false;
    };
    let block = &bundle.recv_blocks[idx];
    if !block.preamble_complete() || bundle.flags.do_not_fragment {
        return false;
    }

    let payload_len = block.data_length;
    let payload_rcvd = bundle.payload.len() as u64;
    if payload_len <= 1 || payload_rcvd == 0 {
        return false;
    }

    if payload_rcvd >= payload_len {
        if block.last_block()
            || bundle
                .recv_blocks
                .last()
                .is_some_and(|b| b.complete && b.last_block())
        {
            return false;
        }
        // Trailing blocks are missing, so drop a byte to make this a
        // strict fragment of the original
        bundle.payload.truncate(payload_len as usize - 1);
    }

    if !bundle.is_fragment {
        bundle.is_fragment = true;
        bundle.frag_offset = 0;
        bundle.orig_length = payload_len;
    }

    let len = bundle.payload.len() as u64;
    bundle.recv_blocks.truncate(idx + 1);
    let block = &mut bundle.recv_blocks[idx];
    block.data_length = len;
    block.complete = true;
    block.flags.last_block = true;

    debug!(
        "Converted partially received bundle {} to a fragment of {len}/{payload_len} bytes",
        bundle.id()
    );
    true
}

struct FragmentState {
    bundle: bpv6::Bundle,
    payload: bytes::BytesMut,
    fragments: Vec<BundleRef>,
    /// Received payload ranges, sorted and merged.
    extents: Vec<(u64, u64)>,
    pre_blocks: Vec<BlockInfo>,
    payload_block: Option<BlockInfo>,
    post_blocks: Vec<BlockInfo>,
}

impl FragmentState {
    fn new(fragment: &bpv6::Bundle) -> Self {
        Self {
            bundle: bpv6::Bundle {
                source: fragment.source.clone(),
                destination: fragment.destination.clone(),
                replyto: fragment.replyto.clone(),
                prevhop: fragment.prevhop.clone(),
                creation_ts: fragment.creation_ts,
                expiration: fragment.expiration,
                flags: fragment.flags,
                orig_length: fragment.orig_length,
                ..Default::default()
            },
            payload: bytes::BytesMut::new(),
            fragments: Vec::new(),
            extents: Vec::new(),
            pre_blocks: Vec::new(),
            payload_block: None,
            post_blocks: Vec::new(),
        }
    }

    fn add_extent(&mut self, start: u64, end: u64) {
        self.extents.push((start, end));
        self.extents.sort_unstable();
        let mut merged: Vec<(u64, u64)> = Vec::with_capacity(self.extents.len());
        for (s, e) in self.extents.drain(..) {
            match merged.last_mut() {
                Some(last) if s <= last.1 => last.1 = last.1.max(e),
                _ => merged.push((s, e)),
            }
        }
        self.extents = merged;
    }

    fn is_complete(&self) -> bool {
        matches!(self.extents.as_slice(), [(0, end)] if *end == self.bundle.orig_length)
    }
}

/// A completed reassembly.
pub struct Reassembled {
    pub bundle: bpv6::Bundle,
    pub fragments: Vec<BundleRef>,
}

/// Reassembly state for fragments addressed to this node, owned by the
/// input stage.
pub struct FragmentManager {
    states: HashMap<String, FragmentState>,
    max_length: u64,
}

impl Default for FragmentManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REASSEMBLY_LENGTH)
    }
}

impl FragmentManager {
    /// Reassembles bundles whose original payload is at most `max_length`
    /// bytes.
    pub fn new(max_length: u64) -> Self {
        Self {
            states: HashMap::new(),
            max_length,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Adds a fragment, returning the reassembled bundle once every byte of
    /// the payload has arrived.
    ///
    /// Where fragments overlap, the bytes of the fragment added last win. A
    /// refused fragment leaves any reassembly in progress untouched.
    #[cfg_attr(feature = "instrument", instrument(skip_all))]
    pub fn process_for_reassembly(
        &mut self,
        fragment: &BundleRef,
    ) -> Result<Option<Reassembled>, ReassemblyError> {
        let (key, complete) = {
            let guard = fragment.lock();
            let frag = &guard.bundle;
            if !frag.is_fragment {
                error!("Bundle {} is not a fragment", frag.id());
                panic!("Reassembly of a bundle that is not a fragment");
            }

            let start = frag.frag_offset;
            let end = start
                .checked_add(frag.frag_length())
                .ok_or(ReassemblyError::ExtentOverflow {
                    offset: start,
                    length: frag.frag_length(),
                })?;
            if end > frag.orig_length {
                return Err(ReassemblyError::PastEnd {
                    end,
                    orig_length: frag.orig_length,
                });
            }
            if frag.orig_length > self.max_length {
                return Err(ReassemblyError::TooLong {
                    length: frag.orig_length,
                    limit: self.max_length,
                });
            }
            let (start_idx, end_idx) = match (usize::try_from(start), usize::try_from(end)) {
                (Ok(s), Ok(e)) => (s, e),
                _ => {
                    return Err(ReassemblyError::TooLong {
                        length: frag.orig_length,
                        limit: self.max_length,
                    });
                }
            };

            let key = fragment_key(frag);
            let state = self
                .states
                .entry(key.clone())
                .or_insert_with(|| FragmentState::new(frag));
            if state.bundle.orig_length != frag.orig_length {
                return Err(ReassemblyError::LengthDisagrees {
                    length: frag.orig_length,
                    expected: state.bundle.orig_length,
                });
            }

            if state.payload.len() < end_idx {
                state.payload.resize(end_idx, 0);
            }
            state.payload[start_idx..end_idx].copy_from_slice(&frag.payload);
            state.add_extent(start, end);
            if !state
                .fragments
                .iter()
                .any(|f| f.bundleid() == fragment.bundleid())
            {
                state.fragments.push(fragment.clone());
            }

            let payload = payload_index(&frag.recv_blocks);
            if start == 0 {
                state.pre_blocks = frag.recv_blocks[..payload.unwrap_or(frag.recv_blocks.len())].to_vec();
                state.bundle.api_blocks = frag.api_blocks.clone();
                state.bundle.generated_metadata = frag.generated_metadata.clone();
            }
            if let Some(p) = payload {
                if state.payload_block.is_none() {
                    state.payload_block = Some(frag.recv_blocks[p].clone());
                }
                if end == frag.orig_length {
                    state.post_blocks = frag.recv_blocks[p + 1..].to_vec();
                }
            }

            trace!(
                "Fragment {} added to reassembly {key}: {:?}",
                frag.id(),
                state.extents
            );
            (key, state.is_complete())
        };

        if !complete {
            return Ok(None);
        }

        let Some(mut state) = self.states.remove(&key) else {
            return Ok(None);
        };
        let mut recv_blocks = std::mem::take(&mut state.pre_blocks);
        if let Some(mut block) = state.payload_block.take() {
            block.data_length = state.bundle.orig_length;
            block.complete = true;
            block.flags.last_block = state.post_blocks.is_empty();
            recv_blocks.push(block);
        }
        recv_blocks.append(&mut state.post_blocks);

        let mut bundle = state.bundle;
        bundle.recv_blocks = recv_blocks;
        bundle.payload = state.payload.freeze();
        debug!(
            "Reassembled bundle {} from {} fragments",
            bundle.id(),
            state.fragments.len()
        );
        Ok(Some(Reassembled {
            bundle,
            fragments: state.fragments,
        }))
    }

    /// Drops any reassembly made redundant by the arrival of the whole
    /// bundle, returning the fragments to delete.
    pub fn delete_obsoleted_fragments(&mut self, bundle: &bpv6::Bundle) -> Vec<BundleRef> {
        match self.states.remove(&fragment_key(bundle)) {
            Some(state) => {
                debug!(
                    "Bundle {} obsoletes {} fragments",
                    bundle.id(),
                    state.fragments.len()
                );
                state.fragments
            }
            None => Vec::new(),
        }
    }

    /// Forgets a fragment that is being deleted.
    pub fn delete_fragment(&mut self, fragment: &BundleRef) {
        let key = fragment_key(&fragment.lock().bundle);
        if let Some(state) = self.states.get_mut(&key) {
            state
                .fragments
                .retain(|f| f.bundleid() != fragment.bundleid());
            if state.fragments.is_empty() {
                self.states.remove(&key);
            }
        }
    }
}

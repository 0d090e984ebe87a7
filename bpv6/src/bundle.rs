use super::*;

/// A BPv6 bundle: the primary block fields, the payload and the extension
/// blocks it arrived with or was given by an application.
#[derive(Default, Debug, Clone)]
pub struct Bundle {
    pub source: Eid,
    pub destination: Eid,
    pub replyto: Eid,
    pub custodian: Eid,
    /// The node the bundle was last received from, if known.
    pub prevhop: Eid,
    pub creation_ts: CreationTimestamp,
    /// Lifetime in seconds from `creation_ts`.
    pub expiration: u64,
    pub flags: BundleFlags,
    pub is_fragment: bool,
    pub frag_offset: u64,
    /// Length of the original application data unit.
    pub orig_length: u64,
    pub payload: bytes::Bytes,
    pub recv_blocks: Vec<BlockInfo>,
    pub api_blocks: Vec<BlockInfo>,
    /// Metadata generated locally, optionally restricted to one link.
    pub generated_metadata: Vec<(Option<String>, MetadataBlock)>,
    pub local_custody: bool,
    /// The custody id assigned when this node took custody, 0 if none.
    pub custody_id: u64,
}

impl Bundle {
    pub fn id(&self) -> BundleId {
        BundleId {
            source: self.source.clone(),
            timestamp: self.creation_ts,
            fragment_info: self.is_fragment.then(|| FragmentInfo {
                offset: self.frag_offset,
                length: self.payload.len() as u64,
            }),
        }
    }

    /// A new administrative bundle from `source` to `destination`.
    pub fn new_admin(
        source: Eid,
        destination: Eid,
        creation_ts: CreationTimestamp,
        expiration: u64,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            source,
            destination,
            creation_ts,
            expiration,
            flags: BundleFlags {
                is_admin_record: true,
                singleton_destination: true,
                ..Default::default()
            },
            orig_length: payload.len() as u64,
            payload: payload.into(),
            ..Default::default()
        }
    }

    pub fn frag_length(&self) -> u64 {
        self.payload.len() as u64
    }

    /// The length of the whole application data unit.
    pub fn adu_length(&self) -> u64 {
        if self.is_fragment {
            self.orig_length
        } else {
            self.payload.len() as u64
        }
    }

    pub fn is_admin(&self) -> bool {
        self.flags.is_admin_record
    }

    pub fn find_recv_block(&self, block_type: BlockType) -> Option<&BlockInfo> {
        self.recv_blocks.iter().find(|b| b.block_type == block_type)
    }

    pub fn source_block(&self, source: BlockSource) -> Option<&BlockInfo> {
        match source {
            BlockSource::Received(idx) => self.recv_blocks.get(idx),
            BlockSource::Api(idx) => self.api_blocks.get(idx),
        }
    }

    /// The received custody transfer enhancement block, if it was created by
    /// the bundle's current custodian.
    pub fn received_cteb(&self) -> Option<&Cteb> {
        self.recv_blocks
            .iter()
            .filter_map(|b| if b.error { None } else { b.cteb() })
            .find(|c| c.creator == self.custodian)
    }

    pub fn creation_time(&self) -> time::OffsetDateTime {
        DtnTime::new(self.creation_ts.seconds, 0).into()
    }

    pub fn expiry(&self) -> time::OffsetDateTime {
        self.creation_time()
            .saturating_add(time::Duration::seconds(self.expiration.min(i64::MAX as u64) as i64))
    }

    pub fn has_expired(&self) -> bool {
        self.expiry() <= time::OffsetDateTime::now_utc()
    }
}

impl std::fmt::Display for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {} ({} bytes)",
            self.id(),
            self.destination,
            self.payload.len()
        )
    }
}

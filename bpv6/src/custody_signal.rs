use super::*;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CustodyReason {
    #[default]
    NoAdditionalInfo,
    RedundantReception,
    DepletedStorage,
    EidUnintelligible,
    NoRouteToDest,
    NoTimelyContact,
    BlockUnintelligible,
    Unassigned(u8),
}

impl From<CustodyReason> for u8 {
    fn from(value: CustodyReason) -> Self {
        match value {
            CustodyReason::NoAdditionalInfo => 0,
            CustodyReason::RedundantReception => 3,
            CustodyReason::DepletedStorage => 4,
            CustodyReason::EidUnintelligible => 5,
            CustodyReason::NoRouteToDest => 6,
            CustodyReason::NoTimelyContact => 7,
            CustodyReason::BlockUnintelligible => 8,
            CustodyReason::Unassigned(v) => v,
        }
    }
}

impl From<u8> for CustodyReason {
    fn from(value: u8) -> Self {
        match value & 0x7F {
            0 => CustodyReason::NoAdditionalInfo,
            3 => CustodyReason::RedundantReception,
            4 => CustodyReason::DepletedStorage,
            5 => CustodyReason::EidUnintelligible,
            6 => CustodyReason::NoRouteToDest,
            7 => CustodyReason::NoTimelyContact,
            8 => CustodyReason::BlockUnintelligible,
            v => CustodyReason::Unassigned(v),
        }
    }
}

impl std::fmt::Display for CustodyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CustodyReason::NoAdditionalInfo => f.write_str("no additional info"),
            CustodyReason::RedundantReception => f.write_str("redundant reception"),
            CustodyReason::DepletedStorage => f.write_str("depleted storage"),
            CustodyReason::EidUnintelligible => f.write_str("eid unintelligible"),
            CustodyReason::NoRouteToDest => f.write_str("no route to dest"),
            CustodyReason::NoTimelyContact => f.write_str("no timely contact"),
            CustodyReason::BlockUnintelligible => f.write_str("block unintelligible"),
            CustodyReason::Unassigned(v) => write!(f, "unknown reason {v}"),
        }
    }
}

/// Packs the succeeded flag and a reason into the single signal byte.
pub(crate) fn pack_status(succeeded: bool, reason: CustodyReason) -> u8 {
    ((succeeded as u8) << 7) | (u8::from(reason) & 0x7F)
}

pub(crate) fn unpack_status(b: u8) -> (bool, CustodyReason) {
    (b & 0x80 != 0, b.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustodySignal {
    pub succeeded: bool,
    pub reason: CustodyReason,
    pub fragment: Option<FragmentInfo>,
    pub signal_time: DtnTime,
    pub creation_ts: CreationTimestamp,
    pub source: Eid,
}

impl CustodySignal {
    /// Builds the administrative bundle carrying a custody signal for `orig`,
    /// addressed to its current custodian.
    ///
    /// # Panics
    ///
    /// Panics if `orig` has no custodian.
    pub fn create_bundle(
        orig: &Bundle,
        local_eid: &Eid,
        succeeded: bool,
        reason: CustodyReason,
        creation_ts: CreationTimestamp,
    ) -> Bundle {
        if orig.custodian.is_null() {
            error!("Custody signal requested for bundle {} with no custodian", orig.id());
            panic!("Custody signal requested for bundle with a null custodian");
        }

        let record = AdministrativeRecord::CustodySignal(Self {
            succeeded,
            reason,
            fragment: orig.is_fragment.then(|| FragmentInfo {
                offset: orig.frag_offset,
                length: orig.frag_length(),
            }),
            signal_time: DtnTime::now(),
            creation_ts: orig.creation_ts,
            source: orig.source.clone(),
        });
        Bundle::new_admin(
            local_eid.clone(),
            orig.custodian.clone(),
            creation_ts,
            orig.expiration,
            record.to_vec(),
        )
    }

    pub(crate) fn encoding_len(&self) -> usize {
        let mut len = 1;
        if let Some(fi) = &self.fragment {
            len += sdnv::encoding_len(fi.offset) + sdnv::encoding_len(fi.length);
        }
        len + self.signal_time.encoding_len()
            + self.creation_ts.encoding_len()
            + sdnv::encoding_len(self.source.len() as u64)
            + self.source.len()
    }

    pub(crate) fn write(&self, w: &mut sdnv::Writer) -> Result<(), sdnv::Error> {
        w.write_u8(pack_status(self.succeeded, self.reason))?;
        if let Some(fi) = &self.fragment {
            w.write_sdnv(fi.offset)?;
            w.write_sdnv(fi.length)?;
        }
        self.signal_time.write(w)?;
        self.creation_ts.write(w)?;
        w.write_sdnv(self.source.len() as u64)?;
        w.write_bytes(self.source.as_str().as_bytes())
    }

    pub(crate) fn parse(r: &mut sdnv::Reader, is_fragment: bool) -> Result<Self, Error> {
        let (succeeded, reason) = unpack_status(r.read_u8().map_field_err("status")?);
        let fragment = if is_fragment {
            Some(FragmentInfo {
                offset: r.read_sdnv().map_field_err("fragment offset")?,
                length: r.read_sdnv().map_field_err("fragment length")?,
            })
        } else {
            None
        };
        Ok(Self {
            succeeded,
            reason,
            fragment,
            signal_time: DtnTime::read(r).map_field_err("signal time")?,
            creation_ts: CreationTimestamp::read(r).map_field_err("creation timestamp")?,
            source: status_report::read_eid(r).map_field_err("source")?,
        })
    }
}

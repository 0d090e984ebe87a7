use super::*;

/// A contiguous run of `length` custody ids beginning at `start`.
///
/// The last id of a run may be `u64::MAX`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AcsFill {
    pub start: u64,
    pub length: u64,
}

impl AcsFill {
    /// The last id in the run.
    pub fn last(&self) -> u64 {
        self.start.saturating_add(self.length.saturating_sub(1))
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> {
        let start = self.start;
        (0..self.length).map_while(move |i| start.checked_add(i))
    }
}

/// An aggregate custody signal: one succeeded/reason status covering every
/// custody id in a set of runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateCustodySignal {
    pub succeeded: bool,
    pub reason: CustodyReason,
    pub fills: Vec<AcsFill>,
}

impl AggregateCustodySignal {
    pub fn custody_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.fills.iter().flat_map(AcsFill::ids)
    }

    /// Builds the administrative bundle carrying this signal to `custodian`.
    pub fn create_bundle(
        &self,
        custodian: &Eid,
        local_eid: &Eid,
        creation_ts: CreationTimestamp,
        expiration: u64,
    ) -> Bundle {
        Bundle::new_admin(
            local_eid.clone(),
            custodian.clone(),
            creation_ts,
            expiration,
            AdministrativeRecord::AggregateCustodySignal(self.clone()).to_vec(),
        )
    }

    /// Wire length of the fill pairs alone.
    pub fn fills_len(&self) -> usize {
        let mut prev = 0;
        self.fills
            .iter()
            .map(|f| {
                let len = sdnv::encoding_len(f.start.saturating_sub(prev))
                    + sdnv::encoding_len(f.length);
                prev = f.last();
                len
            })
            .sum()
    }

    pub(crate) fn encoding_len(&self) -> usize {
        1 + self.fills_len()
    }

    pub(crate) fn write(&self, w: &mut sdnv::Writer) -> Result<(), sdnv::Error> {
        w.write_u8(custody_signal::pack_status(self.succeeded, self.reason))?;
        let mut prev = 0;
        for f in &self.fills {
            w.write_sdnv(f.start.saturating_sub(prev))?;
            w.write_sdnv(f.length)?;
            prev = f.last();
        }
        Ok(())
    }

    pub(crate) fn parse(r: &mut sdnv::Reader) -> Result<Self, Error> {
        let (succeeded, reason) = custody_signal::unpack_status(r.read_u8().map_field_err("status")?);

        let mut fills = Vec::new();
        let mut prev = 0u64;
        while r.remaining() > 0 {
            let diff = r.read_sdnv().map_field_err("fill gap")?;
            let length = r.read_sdnv().map_field_err("fill length")?;
            if diff == 0 || length == 0 {
                return Err(Error::InvalidAcsFill);
            }
            let start = prev.checked_add(diff).ok_or(Error::InvalidAcsFill)?;
            prev = start
                .checked_add(length - 1)
                .ok_or(Error::InvalidAcsFill)?;
            fills.push(AcsFill { start, length });
        }

        if fills.is_empty() {
            return Err(Error::NoAcsFills);
        }
        Ok(Self {
            succeeded,
            reason,
            fills,
        })
    }
}

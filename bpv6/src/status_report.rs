use super::*;

/// Status report reason codes, shared with the deletion and reception
/// reasons carried through block validation.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReasonCode {
    #[default]
    NoAdditionalInformation,
    LifetimeExpired,
    ForwardedOverUnidirectionalLink,
    TransmissionCancelled,
    DepletedStorage,
    EndpointIdUnintelligible,
    NoRouteToDestination,
    NoTimelyContact,
    BlockUnintelligible,
    HopLimitExceeded,
    TrafficPared,
    Unassigned(u8),
}

impl From<ReasonCode> for u8 {
    fn from(value: ReasonCode) -> Self {
        match value {
            ReasonCode::NoAdditionalInformation => 0,
            ReasonCode::LifetimeExpired => 1,
            ReasonCode::ForwardedOverUnidirectionalLink => 2,
            ReasonCode::TransmissionCancelled => 3,
            ReasonCode::DepletedStorage => 4,
            ReasonCode::EndpointIdUnintelligible => 5,
            ReasonCode::NoRouteToDestination => 6,
            ReasonCode::NoTimelyContact => 7,
            ReasonCode::BlockUnintelligible => 8,
            ReasonCode::HopLimitExceeded => 9,
            ReasonCode::TrafficPared => 10,
            ReasonCode::Unassigned(v) => v,
        }
    }
}

impl From<u8> for ReasonCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ReasonCode::NoAdditionalInformation,
            1 => ReasonCode::LifetimeExpired,
            2 => ReasonCode::ForwardedOverUnidirectionalLink,
            3 => ReasonCode::TransmissionCancelled,
            4 => ReasonCode::DepletedStorage,
            5 => ReasonCode::EndpointIdUnintelligible,
            6 => ReasonCode::NoRouteToDestination,
            7 => ReasonCode::NoTimelyContact,
            8 => ReasonCode::BlockUnintelligible,
            9 => ReasonCode::HopLimitExceeded,
            10 => ReasonCode::TrafficPared,
            v => ReasonCode::Unassigned(v),
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ReasonCode::NoAdditionalInformation => "no additional information",
            ReasonCode::LifetimeExpired => "lifetime expired",
            ReasonCode::ForwardedOverUnidirectionalLink => "forwarded over unidirectional link",
            ReasonCode::TransmissionCancelled => "transmission cancelled",
            ReasonCode::DepletedStorage => "depleted storage",
            ReasonCode::EndpointIdUnintelligible => "endpoint id unintelligible",
            ReasonCode::NoRouteToDestination => "no known route to destination",
            ReasonCode::NoTimelyContact => "no timely contact",
            ReasonCode::BlockUnintelligible => "block unintelligible",
            ReasonCode::HopLimitExceeded => "hop limit exceeded",
            ReasonCode::TrafficPared => "traffic pared",
            ReasonCode::Unassigned(_) => "(unknown reason)",
        })
    }
}

/// The individual status assertions of a status report, in wire bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatusFlag {
    Received,
    CustodyAccepted,
    Forwarded,
    Delivered,
    Deleted,
    AckedByApp,
}

impl StatusFlag {
    pub const ALL: [StatusFlag; 6] = [
        StatusFlag::Received,
        StatusFlag::CustodyAccepted,
        StatusFlag::Forwarded,
        StatusFlag::Delivered,
        StatusFlag::Deleted,
        StatusFlag::AckedByApp,
    ];

    pub fn bit(self) -> u8 {
        match self {
            StatusFlag::Received => 0x01,
            StatusFlag::CustodyAccepted => 0x02,
            StatusFlag::Forwarded => 0x04,
            StatusFlag::Delivered => 0x08,
            StatusFlag::Deleted => 0x10,
            StatusFlag::AckedByApp => 0x20,
        }
    }
}

impl std::fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StatusFlag::Received => "received",
            StatusFlag::CustodyAccepted => "custody accepted",
            StatusFlag::Forwarded => "forwarded",
            StatusFlag::Delivered => "delivered",
            StatusFlag::Deleted => "deleted",
            StatusFlag::AckedByApp => "acknowledged by application",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// One timestamp per asserted status, ordered by status bit.
    pub assertions: Vec<(StatusFlag, DtnTime)>,
    pub reason: ReasonCode,
    pub fragment: Option<FragmentInfo>,
    pub creation_ts: CreationTimestamp,
    pub source: Eid,
    /// Any status bits this implementation does not recognise.
    pub unrecognised_flags: u8,
}

impl StatusReport {
    pub fn has(&self, flag: StatusFlag) -> bool {
        self.assertions.iter().any(|(f, _)| *f == flag)
    }

    pub fn status_flags(&self) -> u8 {
        self.assertions
            .iter()
            .fold(self.unrecognised_flags, |flags, (f, _)| flags | f.bit())
    }

    /// A report of a single status for `orig`, stamped now.
    pub fn new(orig: &Bundle, flag: StatusFlag, reason: ReasonCode) -> Self {
        Self {
            assertions: vec![(flag, DtnTime::now())],
            reason,
            fragment: orig.is_fragment.then(|| FragmentInfo {
                offset: orig.frag_offset,
                length: orig.frag_length(),
            }),
            creation_ts: orig.creation_ts,
            source: orig.source.clone(),
            unrecognised_flags: 0,
        }
    }

    /// Builds the administrative bundle carrying a report about `orig`.
    ///
    /// The report goes to the original report-to endpoint, falling back to
    /// the original source, and inherits the original lifetime.
    pub fn create_bundle(
        orig: &Bundle,
        local_eid: &Eid,
        flag: StatusFlag,
        reason: ReasonCode,
        creation_ts: CreationTimestamp,
    ) -> Bundle {
        let destination = if orig.replyto.is_null() {
            orig.source.clone()
        } else {
            orig.replyto.clone()
        };
        let record = AdministrativeRecord::StatusReport(Self::new(orig, flag, reason));
        Bundle::new_admin(
            local_eid.clone(),
            destination,
            creation_ts,
            orig.expiration,
            record.to_vec(),
        )
    }

    /// Length of the record body, after the record type byte.
    pub(crate) fn encoding_len(&self) -> usize {
        let mut len = 2;
        if let Some(fi) = &self.fragment {
            len += sdnv::encoding_len(fi.offset) + sdnv::encoding_len(fi.length);
        }
        len += self
            .assertions
            .iter()
            .map(|(_, t)| t.encoding_len())
            .sum::<usize>();
        len + self.creation_ts.encoding_len()
            + sdnv::encoding_len(self.source.len() as u64)
            + self.source.len()
    }

    pub(crate) fn write(&self, w: &mut sdnv::Writer) -> Result<(), sdnv::Error> {
        let mut assertions = self.assertions.clone();
        assertions.sort_by_key(|(f, _)| *f);

        w.write_u8(self.status_flags())?;
        w.write_u8(self.reason.into())?;
        if let Some(fi) = &self.fragment {
            w.write_sdnv(fi.offset)?;
            w.write_sdnv(fi.length)?;
        }
        for (_, t) in &assertions {
            t.write(w)?;
        }
        self.creation_ts.write(w)?;
        w.write_sdnv(self.source.len() as u64)?;
        w.write_bytes(self.source.as_str().as_bytes())
    }

    /// Parses the body of a status report, after the record type byte.
    pub(crate) fn parse(r: &mut sdnv::Reader, is_fragment: bool) -> Result<Self, Error> {
        let flags = r.read_u8().map_field_err("status flags")?;
        let reason = r.read_u8().map_field_err("reason code")?.into();
        let fragment = if is_fragment {
            Some(FragmentInfo {
                offset: r.read_sdnv().map_field_err("fragment offset")?,
                length: r.read_sdnv().map_field_err("fragment length")?,
            })
        } else {
            None
        };

        let mut assertions = Vec::new();
        for flag in StatusFlag::ALL {
            if flags & flag.bit() != 0 {
                assertions.push((flag, DtnTime::read(r).map_field_err("status time")?));
            }
        }

        let creation_ts = CreationTimestamp::read(r).map_field_err("creation timestamp")?;
        let source = read_eid(r).map_field_err("source")?;

        Ok(Self {
            assertions,
            reason,
            fragment,
            creation_ts,
            source,
            unrecognised_flags: flags & !0x3F,
        })
    }
}

/// Reads an SDNV length-prefixed endpoint id that must end the record.
pub(crate) fn read_eid(r: &mut sdnv::Reader) -> Result<Eid, Error> {
    let len = r.read_sdnv()?;
    if len != r.remaining() as u64 {
        return Err(Error::LengthMismatch {
            declared: len,
            actual: r.remaining(),
        });
    }
    let bytes = r.read_counted(len)?;
    std::str::from_utf8(bytes)
        .map_err(|_| EidError::InvalidCharacter(char::REPLACEMENT_CHARACTER))?
        .parse::<Eid>()
        .map_err(Into::into)
}

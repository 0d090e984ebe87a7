/*!
BPv6 administrative records, carried as the payload of bundles with the
administrative record flag set.

The first byte holds the record type in its high nibble and the record flags
in its low nibble; the only flag defined marks a record about a fragment.
*/

use super::*;

const ADMIN_IS_FRAGMENT: u8 = 0x01;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdminRecordType {
    StatusReport,
    CustodySignal,
    BundleIntegrity,
    AggregateCustodySignal,
    Unrecognised(u8),
}

impl From<AdminRecordType> for u8 {
    fn from(value: AdminRecordType) -> Self {
        match value {
            AdminRecordType::StatusReport => 1,
            AdminRecordType::CustodySignal => 2,
            AdminRecordType::BundleIntegrity => 3,
            AdminRecordType::AggregateCustodySignal => 4,
            AdminRecordType::Unrecognised(v) => v,
        }
    }
}

impl From<u8> for AdminRecordType {
    fn from(value: u8) -> Self {
        match value {
            1 => AdminRecordType::StatusReport,
            2 => AdminRecordType::CustodySignal,
            3 => AdminRecordType::BundleIntegrity,
            4 => AdminRecordType::AggregateCustodySignal,
            v => AdminRecordType::Unrecognised(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdministrativeRecord {
    StatusReport(StatusReport),
    CustodySignal(CustodySignal),
    AggregateCustodySignal(AggregateCustodySignal),
}

impl AdministrativeRecord {
    pub fn record_type(&self) -> AdminRecordType {
        match self {
            AdministrativeRecord::StatusReport(_) => AdminRecordType::StatusReport,
            AdministrativeRecord::CustodySignal(_) => AdminRecordType::CustodySignal,
            AdministrativeRecord::AggregateCustodySignal(_) => {
                AdminRecordType::AggregateCustodySignal
            }
        }
    }

    fn is_fragment(&self) -> bool {
        match self {
            AdministrativeRecord::StatusReport(r) => r.fragment.is_some(),
            AdministrativeRecord::CustodySignal(s) => s.fragment.is_some(),
            AdministrativeRecord::AggregateCustodySignal(_) => false,
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let len = 1 + match self {
            AdministrativeRecord::StatusReport(r) => r.encoding_len(),
            AdministrativeRecord::CustodySignal(s) => s.encoding_len(),
            AdministrativeRecord::AggregateCustodySignal(a) => a.encoding_len(),
        };
        let mut buf = vec![0u8; len];
        let mut w = sdnv::Writer::new(&mut buf);
        let mut header = u8::from(self.record_type()) << 4;
        if self.is_fragment() {
            header |= ADMIN_IS_FRAGMENT;
        }
        w.write_u8(header)
            .and_then(|_| match self {
                AdministrativeRecord::StatusReport(r) => r.write(&mut w),
                AdministrativeRecord::CustodySignal(s) => s.write(&mut w),
                AdministrativeRecord::AggregateCustodySignal(a) => a.write(&mut w),
            })
            .trace_expect("Administrative record buffer sized incorrectly");
        buf
    }

    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        let mut r = sdnv::Reader::new(buf);
        let header = r.read_u8().map_field_err("record type")?;
        let is_fragment = header & ADMIN_IS_FRAGMENT != 0;
        let record = match AdminRecordType::from(header >> 4) {
            AdminRecordType::StatusReport => {
                Self::StatusReport(StatusReport::parse(&mut r, is_fragment)?)
            }
            AdminRecordType::CustodySignal => {
                Self::CustodySignal(CustodySignal::parse(&mut r, is_fragment)?)
            }
            AdminRecordType::AggregateCustodySignal => {
                Self::AggregateCustodySignal(AggregateCustodySignal::parse(&mut r)?)
            }
            _ => return Err(Error::InvalidAdminType(header >> 4)),
        };
        if r.remaining() != 0 {
            return Err(Error::AdditionalData(r.remaining()));
        }
        Ok(record)
    }
}

impl std::fmt::Display for AdministrativeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdministrativeRecord::StatusReport(r) => {
                write!(f, "Status report for {},{}:", r.source, r.creation_ts)?;
                for (flag, t) in &r.assertions {
                    write!(f, " {flag} at {t}")?;
                }
                write!(f, " (reason: {})", r.reason)
            }
            AdministrativeRecord::CustodySignal(s) => write!(
                f,
                "Custody signal for {},{}: {} ({})",
                s.source,
                s.creation_ts,
                if s.succeeded { "succeeded" } else { "failed" },
                s.reason
            ),
            AdministrativeRecord::AggregateCustodySignal(a) => {
                write!(
                    f,
                    "Aggregate custody signal: {} ({}), ids",
                    if a.succeeded { "succeeded" } else { "failed" },
                    a.reason
                )?;
                for fill in &a.fills {
                    write!(f, " {}..={}", fill.start, fill.last())?;
                }
                Ok(())
            }
        }
    }
}

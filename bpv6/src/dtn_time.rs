use super::*;

const DTN_EPOCH: time::OffsetDateTime = time::macros::datetime!(2000-01-01 00:00:00 UTC);

/// A DTN time: seconds and nanoseconds since 2000-01-01 00:00:00 UTC, as
/// carried in administrative records.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DtnTime {
    seconds: u64,
    nanos: u32,
}

impl DtnTime {
    pub fn now() -> Self {
        time::OffsetDateTime::now_utc()
            .try_into()
            .unwrap_or_default()
    }

    pub fn new(seconds: u64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    pub(crate) fn encoding_len(&self) -> usize {
        sdnv::encoding_len(self.seconds) + sdnv::encoding_len(self.nanos as u64)
    }

    pub(crate) fn write(&self, w: &mut sdnv::Writer) -> Result<(), sdnv::Error> {
        w.write_sdnv(self.seconds)?;
        w.write_sdnv(self.nanos as u64)?;
        Ok(())
    }

    pub(crate) fn read(r: &mut sdnv::Reader) -> Result<Self, sdnv::Error> {
        Ok(Self {
            seconds: r.read_sdnv()?,
            nanos: r.read_sdnv()?.min(999_999_999) as u32,
        })
    }
}

impl TryFrom<time::OffsetDateTime> for DtnTime {
    type Error = time::error::ConversionRange;

    fn try_from(instant: time::OffsetDateTime) -> Result<Self, Self::Error> {
        let elapsed = instant - DTN_EPOCH;
        if elapsed.is_negative() {
            Err(time::error::ConversionRange)
        } else {
            Ok(Self {
                seconds: elapsed.whole_seconds() as u64,
                nanos: elapsed.subsec_nanoseconds() as u32,
            })
        }
    }
}

impl From<DtnTime> for time::OffsetDateTime {
    fn from(dtn_time: DtnTime) -> Self {
        DTN_EPOCH.saturating_add(time::Duration::new(
            dtn_time.seconds.min(i64::MAX as u64) as i64,
            dtn_time.nanos as i32,
        ))
    }
}

impl std::fmt::Display for DtnTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch() {
        let t: DtnTime = time::macros::datetime!(2000-01-01 00:01:40.5 UTC)
            .try_into()
            .unwrap();
        assert_eq!(t.seconds(), 100);
        assert_eq!(t.nanos(), 500_000_000);
        assert_eq!(
            time::OffsetDateTime::from(t),
            time::macros::datetime!(2000-01-01 00:01:40.5 UTC)
        );
        assert!(DtnTime::try_from(time::macros::datetime!(1999-12-31 23:59:59 UTC)).is_err());
        assert!(DtnTime::now().seconds() > 700_000_000);
    }
}

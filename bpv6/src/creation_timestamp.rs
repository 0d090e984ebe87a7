use super::*;

/// The creation timestamp of a bundle: seconds since the DTN epoch and a
/// sequence number distinguishing bundles created in the same second.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CreationTimestamp {
    pub seconds: u64,
    pub seqno: u64,
}

impl CreationTimestamp {
    pub fn new(seconds: u64, seqno: u64) -> Self {
        Self { seconds, seqno }
    }

    pub fn now(seqno: u64) -> Self {
        Self {
            seconds: DtnTime::now().seconds(),
            seqno,
        }
    }

    pub fn encoding_len(&self) -> usize {
        sdnv::encoding_len(self.seconds) + sdnv::encoding_len(self.seqno)
    }

    pub fn write(&self, w: &mut sdnv::Writer) -> Result<(), sdnv::Error> {
        w.write_sdnv(self.seconds)?;
        w.write_sdnv(self.seqno)?;
        Ok(())
    }

    pub fn read(r: &mut sdnv::Reader) -> Result<Self, sdnv::Error> {
        Ok(Self {
            seconds: r.read_sdnv()?,
            seqno: r.read_sdnv()?,
        })
    }
}

impl std::fmt::Display for CreationTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.seconds, self.seqno)
    }
}

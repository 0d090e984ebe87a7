use super::*;

/// A custody transfer enhancement block: the custody id assigned by the
/// custodian that created it, used to aggregate custody signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cteb {
    pub custody_id: u64,
    pub creator: Eid,
}

impl Cteb {
    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        let mut r = sdnv::Reader::new(buf);
        let custody_id = r.read_sdnv().map_field_err("custody id")?;
        let creator = std::str::from_utf8(r.rest())
            .map_err(|_| EidError::InvalidCharacter(char::REPLACEMENT_CHARACTER))
            .and_then(str::parse)
            .map_field_err("creator custodian")?;
        Ok(Self {
            custody_id,
            creator,
        })
    }

    pub fn encoding_len(&self) -> usize {
        sdnv::encoding_len(self.custody_id) + self.creator.len()
    }

    pub fn write(&self, w: &mut sdnv::Writer) -> Result<(), sdnv::Error> {
        w.write_sdnv(self.custody_id)?;
        w.write_bytes(self.creator.as_str().as_bytes())
    }
}

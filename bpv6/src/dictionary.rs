use super::*;

/// The primary block dictionary: a byte array of null-terminated scheme and
/// SSP strings that endpoint references index into.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    bytes: Vec<u8>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn offset_of(&self, s: &str) -> Option<u64> {
        let mut offset = 0;
        for entry in self.bytes.split(|b| *b == 0) {
            if entry == s.as_bytes() && offset + entry.len() < self.bytes.len() {
                return Some(offset as u64);
            }
            offset += entry.len() + 1;
        }
        None
    }

    fn add_str(&mut self, s: &str) -> u64 {
        if let Some(offset) = self.offset_of(s) {
            return offset;
        }
        let offset = self.bytes.len() as u64;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        offset
    }

    /// Adds an endpoint, returning its (scheme, ssp) offsets. Strings already
    /// present are shared.
    pub fn add(&mut self, eid: &Eid) -> (u64, u64) {
        (self.add_str(eid.scheme()), self.add_str(eid.ssp()))
    }

    /// The (scheme, ssp) offsets of an endpoint previously added.
    pub fn offsets(&self, eid: &Eid) -> Option<(u64, u64)> {
        Some((self.offset_of(eid.scheme())?, self.offset_of(eid.ssp())?))
    }

    fn get_str(&self, offset: u64) -> Result<&str, Error> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|o| *o < self.bytes.len())
            .ok_or(Error::InvalidDictionaryOffset(offset))?;
        let len = self.bytes[start..]
            .iter()
            .position(|b| *b == 0)
            .ok_or(Error::InvalidDictionaryOffset(offset))?;
        std::str::from_utf8(&self.bytes[start..start + len])
            .map_err(|_| Error::InvalidDictionaryOffset(offset))
    }

    pub fn lookup(&self, scheme_offset: u64, ssp_offset: u64) -> Result<Eid, Error> {
        Eid::from_parts(self.get_str(scheme_offset)?, self.get_str(ssp_offset)?)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_strings() {
        let mut dict = Dictionary::new();
        let a: Eid = "dtn://node1/app".parse().unwrap();
        let b: Eid = "dtn://node2/app".parse().unwrap();
        assert_eq!(dict.add(&a), (0, 4));
        assert_eq!(dict.add(&b), (0, 16));
        assert_eq!(dict.add(&Eid::null()), (0, 28));
        assert_eq!(dict.add(&a), (0, 4));
        assert_eq!(dict.lookup(0, 16).unwrap(), b);
        assert_eq!(dict.lookup(0, 28).unwrap(), Eid::null());
        assert!(dict.lookup(0, 1000).is_err());
    }
}

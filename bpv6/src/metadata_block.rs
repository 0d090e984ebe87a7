use super::*;

/// How the declared length inside a metadata block is treated.
///
/// Deployed peers disagree on this field, so the default takes the data to be
/// whatever follows the length SDNV and ignores the declared value.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum MetadataLengthMode {
    #[default]
    Remaining,
    Strict,
}

/// The parsed contents of a metadata extension block, plus any per-link
/// edits made while the bundle is held.
#[derive(Default, Debug, Clone)]
pub struct MetadataBlock {
    pub ontology: u64,
    pub data: bytes::Bytes,
    /// Block flags used when this metadata is generated locally.
    pub flags: BlockFlags,
    pub error: bool,
    removed: Vec<String>,
    modified: Vec<(String, bytes::Bytes)>,
}

impl MetadataBlock {
    pub fn new(ontology: u64, data: impl Into<bytes::Bytes>) -> Self {
        Self {
            ontology,
            data: data.into(),
            ..Default::default()
        }
    }

    /// A block marked as unparseable.
    pub fn errored() -> Self {
        Self {
            error: true,
            ..Default::default()
        }
    }

    pub fn parse(buf: &[u8], mode: MetadataLengthMode) -> Result<Self, Error> {
        let mut r = sdnv::Reader::new(buf);
        let ontology = r.read_sdnv().map_field_err("ontology")?;
        let length = r.read_sdnv().map_field_err("ontology length")?;
        if mode == MetadataLengthMode::Strict && length != r.remaining() as u64 {
            return Err(Error::LengthMismatch {
                declared: length,
                actual: r.remaining(),
            });
        }
        Ok(Self::new(ontology, bytes::Bytes::copy_from_slice(r.rest())))
    }

    /// Wire length of ontology, length and data for `data`.
    pub fn encoding_len(&self, data: &[u8]) -> usize {
        sdnv::encoding_len(self.ontology) + sdnv::encoding_len(data.len() as u64) + data.len()
    }

    pub fn write(&self, data: &[u8], w: &mut sdnv::Writer) -> Result<(), sdnv::Error> {
        w.write_sdnv(self.ontology)?;
        w.write_sdnv(data.len() as u64)?;
        w.write_bytes(data)
    }

    /// Drops this metadata from bundles sent on `link`.
    pub fn remove_for_link(&mut self, link: &str) {
        if !self.is_removed(link) {
            self.removed.push(link.to_string());
        }
    }

    pub fn is_removed(&self, link: &str) -> bool {
        self.removed.iter().any(|l| l == link)
    }

    /// Replaces the data sent on `link`.
    pub fn modify_for_link(&mut self, link: &str, data: impl Into<bytes::Bytes>) {
        let data = data.into();
        match self.modified.iter_mut().find(|(l, _)| l == link) {
            Some((_, d)) => *d = data,
            None => self.modified.push((link.to_string(), data)),
        }
    }

    pub fn modified_for(&self, link: &str) -> Option<&bytes::Bytes> {
        self.modified
            .iter()
            .find_map(|(l, d)| (l == link).then_some(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn length_modes() {
        let good = hex!("01 03 616263");
        let m = MetadataBlock::parse(&good, MetadataLengthMode::Strict).unwrap();
        assert_eq!(m.ontology, 1);
        assert_eq!(&m.data[..], b"abc");

        let short = hex!("01 05 616263");
        assert!(MetadataBlock::parse(&short, MetadataLengthMode::Strict).is_err());
        let m = MetadataBlock::parse(&short, MetadataLengthMode::Remaining).unwrap();
        assert_eq!(&m.data[..], b"abc");

        assert!(MetadataBlock::parse(&hex!("81"), MetadataLengthMode::Remaining).is_err());
    }

    #[test]
    fn per_link() {
        let mut m = MetadataBlock::new(2, &b"data"[..]);
        m.remove_for_link("a");
        m.remove_for_link("a");
        m.modify_for_link("b", &b"x"[..]);
        m.modify_for_link("b", &b"yz"[..]);
        assert!(m.is_removed("a"));
        assert!(!m.is_removed("b"));
        assert_eq!(m.modified_for("b").map(|d| &d[..]), Some(&b"yz"[..]));
        assert!(m.modified_for("a").is_none());
    }
}

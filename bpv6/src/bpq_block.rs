/*!
The Bundle Protocol Query extension block, used to query and publish cached
content in the network.
*/

use super::*;
use std::fmt::Write;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BpqKind {
    Query,
    Response,
    ResponseDoNotCacheFragment,
    Publish,
}

impl From<BpqKind> for u8 {
    fn from(value: BpqKind) -> Self {
        match value {
            BpqKind::Query => 0,
            BpqKind::Response => 1,
            BpqKind::ResponseDoNotCacheFragment => 2,
            BpqKind::Publish => 3,
        }
    }
}

impl TryFrom<u8> for BpqKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BpqKind::Query),
            1 => Ok(BpqKind::Response),
            2 => Ok(BpqKind::ResponseDoNotCacheFragment),
            3 => Ok(BpqKind::Publish),
            v => Err(Error::InvalidBpqKind(v)),
        }
    }
}

impl std::fmt::Display for BpqKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BpqKind::Query => "query",
            BpqKind::Response => "response",
            BpqKind::ResponseDoNotCacheFragment => "response (do not cache fragments)",
            BpqKind::Publish => "publish",
        })
    }
}

/// The only matching rule defined: the query value must match exactly.
pub const MATCHING_RULE_EXACT: u8 = 0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BpqFragment {
    pub offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpqBlock {
    pub kind: BpqKind,
    pub matching_rule: u8,
    pub creation_ts: CreationTimestamp,
    pub source: Eid,
    pub query: bytes::Bytes,
    fragments: Vec<BpqFragment>,
}

impl BpqBlock {
    pub fn new(
        kind: BpqKind,
        creation_ts: CreationTimestamp,
        source: Eid,
        query: impl Into<bytes::Bytes>,
    ) -> Self {
        Self {
            kind,
            matching_rule: MATCHING_RULE_EXACT,
            creation_ts,
            source,
            query: query.into(),
            fragments: Vec::new(),
        }
    }

    pub fn fragments(&self) -> &[BpqFragment] {
        &self.fragments
    }

    /// Records a fragment, keeping the list ordered by offset.
    pub fn add_fragment(&mut self, fragment: BpqFragment) {
        let idx = self.fragments.partition_point(|f| f.offset <= fragment.offset);
        self.fragments.insert(idx, fragment);
    }

    /// True if `other` asks for the same thing under the same rule.
    pub fn matches(&self, other: &BpqBlock) -> bool {
        self.matching_rule == other.matching_rule
            && self.query.len() == other.query.len()
            && self.query == other.query
    }

    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        let mut r = sdnv::Reader::new(buf);
        let kind = r.read_u8().map_field_err("kind")?.try_into()?;
        let matching_rule = r.read_u8().map_field_err("matching rule")?;
        if matching_rule != MATCHING_RULE_EXACT {
            return Err(Error::InvalidMatchingRule(matching_rule));
        }
        let creation_ts = CreationTimestamp::read(&mut r).map_field_err("creation timestamp")?;

        let len = r.read_sdnv().map_field_err("source length")?;
        let source = r
            .read_counted(len)
            .map_field_err("source")?;
        let source = std::str::from_utf8(source)
            .map_err(|_| EidError::InvalidCharacter(char::REPLACEMENT_CHARACTER))
            .and_then(str::parse)
            .map_field_err("source")?;

        let len = r.read_sdnv().map_field_err("query length")?;
        let query = bytes::Bytes::copy_from_slice(r.read_counted(len).map_field_err("query")?);

        let count = r.read_sdnv().map_field_err("fragment count")?;
        let mut block = Self {
            kind,
            matching_rule,
            creation_ts,
            source,
            query,
            fragments: Vec::new(),
        };
        for _ in 0..count {
            let offset = r.read_sdnv().map_field_err("fragment offset")?;
            let length = r.read_sdnv().map_field_err("fragment length")?;
            block.add_fragment(BpqFragment { offset, length });
        }

        if r.remaining() != 0 {
            return Err(Error::AdditionalData(r.remaining()));
        }
        Ok(block)
    }

    pub fn encoding_len(&self) -> usize {
        2 + self.creation_ts.encoding_len()
            + sdnv::encoding_len(self.source.len() as u64)
            + self.source.len()
            + sdnv::encoding_len(self.query.len() as u64)
            + self.query.len()
            + sdnv::encoding_len(self.fragments.len() as u64)
            + self
                .fragments
                .iter()
                .map(|f| sdnv::encoding_len(f.offset) + sdnv::encoding_len(f.length))
                .sum::<usize>()
    }

    pub fn write(&self, w: &mut sdnv::Writer) -> Result<(), sdnv::Error> {
        w.write_u8(self.kind.into())?;
        w.write_u8(self.matching_rule)?;
        self.creation_ts.write(w)?;
        w.write_sdnv(self.source.len() as u64)?;
        w.write_bytes(self.source.as_str().as_bytes())?;
        w.write_sdnv(self.query.len() as u64)?;
        w.write_bytes(&self.query)?;
        w.write_sdnv(self.fragments.len() as u64)?;
        for f in &self.fragments {
            w.write_sdnv(f.offset)?;
            w.write_sdnv(f.length)?;
        }
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoding_len()];
        self.write(&mut sdnv::Writer::new(&mut buf))
            .trace_expect("BPQ block buffer sized incorrectly");
        buf
    }

    /// Renders raw block data for display.
    ///
    /// Every field is bounds checked as it is read, so a block whose declared
    /// lengths overrun the data is reported rather than trusted.
    pub fn format(data: &[u8], out: &mut dyn Write) -> std::fmt::Result {
        const TOO_SHORT: &str = "Block too short\n";

        out.write_str("Query Extension (BPQ):\n")?;
        let mut r = sdnv::Reader::new(data);

        let Ok(kind) = r.read_u8() else {
            return out.write_str(TOO_SHORT);
        };
        match BpqKind::try_from(kind) {
            Ok(kind) => writeln!(out, "    Kind: {kind}")?,
            Err(_) => writeln!(out, "    Kind: Unknown kind: {kind}")?,
        }

        let Ok(rule) = r.read_u8() else {
            return out.write_str(TOO_SHORT);
        };
        writeln!(out, "    Matching rule: {rule}")?;

        let Ok(ts) = CreationTimestamp::read(&mut r) else {
            return out.write_str(TOO_SHORT);
        };
        writeln!(out, "    Original creation ts: {ts}")?;

        let Some(source) = r.read_sdnv().ok().and_then(|len| r.read_counted(len).ok())
        else {
            return out.write_str(TOO_SHORT);
        };
        writeln!(
            out,
            "    Source EID: {} (length {})",
            String::from_utf8_lossy(source),
            source.len()
        )?;

        let Some(query) = r.read_sdnv().ok().and_then(|len| r.read_counted(len).ok())
        else {
            return out.write_str(TOO_SHORT);
        };
        writeln!(
            out,
            "    Query value: {} (length {})",
            String::from_utf8_lossy(query).trim_end_matches('\0'),
            query.len()
        )?;

        let Ok(count) = r.read_sdnv() else {
            return out.write_str(TOO_SHORT);
        };
        writeln!(out, "    Number of fragments: {count}")?;
        for k in 0..count {
            let (Ok(offset), Ok(length)) = (r.read_sdnv(), r.read_sdnv()) else {
                return out.write_str(TOO_SHORT);
            };
            writeln!(out, "    [{k}] Offset: {offset}, Length: {length}")?;
        }
        Ok(())
    }
}

/*!
A block as held in a bundle's received or API block list, or in a per-link
transmit list.

The `contents` buffer holds the serialized preamble followed by the block
data, except for the payload block whose data lives in the bundle itself.
*/

use super::*;

/// Parsed, processor-specific state attached to a block.
#[derive(Debug, Clone)]
pub enum BlockLocals {
    Metadata(MetadataBlock),
    Bpq(BpqBlock),
    Cteb(Cteb),
}

/// Where a transmit block was prepared from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockSource {
    Received(usize),
    Api(usize),
}

#[derive(Debug, Clone)]
pub struct BlockInfo {
    pub block_type: BlockType,
    pub flags: BlockFlags,
    pub eid_refs: Vec<Eid>,
    /// Dictionary offsets as read from the wire, resolved into `eid_refs`
    /// once the primary block dictionary is known.
    pub dict_refs: Vec<(u64, u64)>,
    pub contents: Vec<u8>,
    pub data_offset: usize,
    pub data_length: u64,
    pub complete: bool,
    pub error: bool,
    pub locals: Option<BlockLocals>,
    pub source: Option<BlockSource>,
}

impl BlockInfo {
    pub fn new(block_type: BlockType) -> Self {
        Self {
            block_type,
            flags: BlockFlags::default(),
            eid_refs: Vec::new(),
            dict_refs: Vec::new(),
            contents: Vec::new(),
            data_offset: 0,
            data_length: 0,
            complete: false,
            error: false,
            locals: None,
            source: None,
        }
    }

    /// A transmit block copied from a received or API block.
    pub fn from_source(original: &BlockInfo, source: BlockSource) -> Self {
        Self {
            flags: original.flags,
            eid_refs: original.eid_refs.clone(),
            source: Some(source),
            ..Self::new(original.block_type)
        }
    }

    /// True once the preamble has been read and the data length is known.
    pub fn preamble_complete(&self) -> bool {
        self.data_offset != 0
    }

    pub fn data(&self) -> &[u8] {
        self.contents.get(self.data_offset..).unwrap_or_default()
    }

    /// The preamble and data lengths together, or `None` if the declared
    /// data length cannot be held in memory.
    pub fn full_length(&self) -> Option<usize> {
        usize::try_from(self.data_length)
            .ok()
            .and_then(|len| self.data_offset.checked_add(len))
    }

    pub fn last_block(&self) -> bool {
        self.flags.last_block
    }

    pub fn metadata(&self) -> Option<&MetadataBlock> {
        match &self.locals {
            Some(BlockLocals::Metadata(m)) => Some(m),
            _ => None,
        }
    }

    pub fn metadata_mut(&mut self) -> Option<&mut MetadataBlock> {
        match &mut self.locals {
            Some(BlockLocals::Metadata(m)) => Some(m),
            _ => None,
        }
    }

    pub fn bpq(&self) -> Option<&BpqBlock> {
        match &self.locals {
            Some(BlockLocals::Bpq(b)) => Some(b),
            _ => None,
        }
    }

    pub fn cteb(&self) -> Option<&Cteb> {
        match &self.locals {
            Some(BlockLocals::Cteb(c)) => Some(c),
            _ => None,
        }
    }
}

/// A decoded block preamble.
#[derive(Debug)]
pub(crate) struct Preamble {
    pub block_type: BlockType,
    pub flags: BlockFlags,
    pub dict_refs: Vec<(u64, u64)>,
    pub data_length: u64,
}

impl Preamble {
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), Error> {
        let mut r = sdnv::Reader::new(buf);
        let block_type = r.read_u8()?.into();
        let flags: BlockFlags = r.read_sdnv()?.into();
        let mut dict_refs = Vec::new();
        if flags.eid_refs {
            let count = r.read_sdnv()?;
            for _ in 0..count {
                let scheme = r.read_sdnv()?;
                let ssp = r.read_sdnv()?;
                dict_refs.push((scheme, ssp));
            }
        }
        let data_length = r.read_sdnv()?;
        Ok((
            Self {
                block_type,
                flags,
                dict_refs,
                data_length,
            },
            r.position(),
        ))
    }

    pub fn encoding_len(&self) -> usize {
        let mut len = 1 + sdnv::encoding_len(self.flags.into());
        if self.flags.eid_refs {
            len += sdnv::encoding_len(self.dict_refs.len() as u64);
            for (scheme, ssp) in &self.dict_refs {
                len += sdnv::encoding_len(*scheme) + sdnv::encoding_len(*ssp);
            }
        }
        len + sdnv::encoding_len(self.data_length)
    }

    pub fn write(&self, w: &mut sdnv::Writer) -> Result<(), sdnv::Error> {
        w.write_u8(self.block_type.into())?;
        w.write_sdnv(self.flags.into())?;
        if self.flags.eid_refs {
            w.write_sdnv(self.dict_refs.len() as u64)?;
            for (scheme, ssp) in &self.dict_refs {
                w.write_sdnv(*scheme)?;
                w.write_sdnv(*ssp)?;
            }
        }
        w.write_sdnv(self.data_length)?;
        Ok(())
    }
}

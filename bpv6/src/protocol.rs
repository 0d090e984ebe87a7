/*!
Whole-bundle operations over the block processor registry: parsing a
serialized bundle, validating it, and preparing and generating the per-link
transmit block lists.
*/

use super::*;
use hashbrown::HashMap;
use processor::*;

pub struct BundleProtocol {
    processors: HashMap<BlockType, Box<dyn BlockProcessor>>,
    unknown: UnknownBlockProcessor,
}

impl Default for BundleProtocol {
    fn default() -> Self {
        Self::new(MetadataLengthMode::default())
    }
}

impl BundleProtocol {
    /// A registry with the standard processors installed.
    pub fn new(metadata_mode: MetadataLengthMode) -> Self {
        let mut protocol = Self {
            processors: HashMap::new(),
            unknown: UnknownBlockProcessor,
        };
        protocol.register(Box::new(PayloadBlockProcessor));
        protocol.register(Box::new(MetadataBlockProcessor::new(metadata_mode)));
        protocol.register(Box::new(BpqBlockProcessor));
        protocol.register(Box::new(CtebBlockProcessor));
        protocol
    }

    /// Installs `processor`, replacing any existing processor for its type.
    pub fn register(&mut self, processor: Box<dyn BlockProcessor>) {
        let block_type = processor.block_type();
        if self.processors.insert(block_type, processor).is_some() {
            debug!("Replaced block processor for type {}", u8::from(block_type));
        }
    }

    pub fn find_processor(&self, block_type: BlockType) -> &dyn BlockProcessor {
        self.processors
            .get(&block_type)
            .map(|p| &**p)
            .unwrap_or(&self.unknown)
    }

    /// Parses a serialized bundle, returning it and the bytes consumed.
    ///
    /// If the data runs out inside or after the payload block, the bundle is
    /// returned as received so far: the payload holds the bytes that arrived
    /// and the payload block is left incomplete.
    pub fn consume(&self, buf: &[u8]) -> Result<(Bundle, usize), Error> {
        let (mut bundle, dict, mut offset) = primary_block::parse(buf)?;

        loop {
            if offset >= buf.len() {
                if bundle.find_recv_block(BlockType::Payload).is_some() {
                    break;
                }
                return Err(sdnv::Error::NotEnoughData.into());
            }

            let block_type = BlockType::from(buf[offset]);
            let mut block = BlockInfo::new(block_type);
            offset += self
                .find_processor(block_type)
                .consume(&mut block, &buf[offset..])?;

            if !block.preamble_complete() {
                return Err(sdnv::Error::NotEnoughData.into());
            }

            block.eid_refs = block
                .dict_refs
                .iter()
                .map(|(scheme, ssp)| dict.lookup(*scheme, *ssp))
                .collect::<Result<Vec<_>, _>>()
                .map_field_err("EID reference")?;

            if block_type == BlockType::Payload {
                bundle.payload = block.contents.split_off(block.data_offset).into();
            } else if !block.complete {
                return Err(sdnv::Error::NotEnoughData.into());
            }

            let last = block.last_block();
            let complete = block.complete;
            bundle.recv_blocks.push(block);
            if last || !complete {
                break;
            }
        }

        if !bundle.is_fragment {
            bundle.orig_length = bundle.payload.len() as u64;
        }
        Ok((bundle, offset))
    }

    /// Runs every received block through its processor's validation.
    ///
    /// Returns false if the bundle must be deleted, with `deletion_reason`
    /// set. `reception_reason` is updated if a reception report is due.
    pub fn validate(
        &self,
        bundle: &Bundle,
        reception_reason: &mut ReasonCode,
        deletion_reason: &mut ReasonCode,
    ) -> bool {
        if bundle.find_recv_block(BlockType::Payload).is_none() {
            warn!("Bundle {} has no payload block", bundle.id());
            *deletion_reason = ReasonCode::BlockUnintelligible;
            return false;
        }

        if !bundle.recv_blocks.last().is_some_and(BlockInfo::last_block) {
            warn!("Bundle {} has no last block", bundle.id());
            *deletion_reason = ReasonCode::BlockUnintelligible;
            return false;
        }

        for block in &bundle.recv_blocks {
            if !self.find_processor(block.block_type).validate(
                bundle,
                block,
                reception_reason,
                deletion_reason,
            ) {
                debug!(
                    "Block of type {} failed validation: {deletion_reason}",
                    u8::from(block.block_type)
                );
                return false;
            }
        }
        true
    }

    /// Builds the transmit block list for `link`: the primary block, API
    /// blocks and generated blocks, then the received blocks in order, and a
    /// payload block if none was received.
    pub fn prepare_blocks(&self, bundle: &Bundle, link: &str) -> Vec<BlockInfo> {
        let mut xmit_blocks = vec![BlockInfo::new(BlockType::Primary)];

        for (idx, block) in bundle.api_blocks.iter().enumerate() {
            self.find_processor(block.block_type).prepare(
                bundle,
                &mut xmit_blocks,
                Some(BlockSource::Api(idx)),
                link,
            );
        }
        self.find_processor(BlockType::Metadata)
            .prepare(bundle, &mut xmit_blocks, None, link);
        self.find_processor(BlockType::CustodyTransferEnhancement)
            .prepare(bundle, &mut xmit_blocks, None, link);

        for (idx, block) in bundle.recv_blocks.iter().enumerate() {
            self.find_processor(block.block_type).prepare(
                bundle,
                &mut xmit_blocks,
                Some(BlockSource::Received(idx)),
                link,
            );
        }

        if !xmit_blocks
            .iter()
            .any(|b| b.block_type == BlockType::Payload)
        {
            self.find_processor(BlockType::Payload)
                .prepare(bundle, &mut xmit_blocks, None, link);
        }
        xmit_blocks
    }

    /// Generates the wire form of every prepared block.
    pub fn generate_blocks(
        &self,
        bundle: &Bundle,
        xmit_blocks: &mut [BlockInfo],
        link: &str,
    ) -> Result<(), Error> {
        let dict = primary_block::build_dictionary(bundle, xmit_blocks);
        let last = xmit_blocks.len() - 1;

        let Some((primary, blocks)) = xmit_blocks.split_first_mut() else {
            error!("Empty transmit block list");
            panic!("Empty transmit block list");
        };
        if primary.block_type != BlockType::Primary {
            error!("Transmit block list does not start with a primary block");
            panic!("Transmit block list does not start with a primary block");
        }

        for (idx, block) in blocks.iter_mut().enumerate() {
            self.find_processor(block.block_type)
                .generate(bundle, block, &dict, link, idx + 1 == last)?;
        }

        primary.contents = primary_block::generate(bundle, &dict)?;
        primary.data_length = primary.contents.len() as u64;
        primary.complete = true;
        Ok(())
    }

    /// The encoded length of the bundle, payload included.
    pub fn total_length(bundle: &Bundle, xmit_blocks: &[BlockInfo]) -> usize {
        xmit_blocks
            .iter()
            .map(|b| {
                if b.block_type == BlockType::Payload {
                    b.contents.len() + bundle.payload.len()
                } else {
                    b.contents.len()
                }
            })
            .sum()
    }

    /// The offset of the first payload byte in the encoded bundle.
    pub fn payload_offset(xmit_blocks: &[BlockInfo]) -> usize {
        let mut offset = 0;
        for b in xmit_blocks {
            offset += b.contents.len();
            if b.block_type == BlockType::Payload {
                break;
            }
        }
        offset
    }

    /// Serializes a generated transmit block list.
    pub fn produce(bundle: &Bundle, xmit_blocks: &[BlockInfo]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::total_length(bundle, xmit_blocks));
        for b in xmit_blocks {
            buf.extend_from_slice(&b.contents);
            if b.block_type == BlockType::Payload {
                buf.extend_from_slice(&bundle.payload);
            }
        }
        buf
    }

    /// Encodes a whole bundle for `link` in one step.
    pub fn encode(&self, bundle: &Bundle, link: &str) -> Result<Vec<u8>, Error> {
        let mut xmit_blocks = self.prepare_blocks(bundle, link);
        self.generate_blocks(bundle, &mut xmit_blocks, link)?;
        Ok(Self::produce(bundle, &xmit_blocks))
    }

    /// Renders a block for display.
    pub fn format_block(&self, block: &BlockInfo) -> String {
        let mut s = String::new();
        if self
            .find_processor(block.block_type)
            .format(block, &mut s)
            .is_err()
        {
            s.push_str("(format error)");
        }
        s
    }
}

/*!
The block processor framework.

Each extension block type is handled by a [`BlockProcessor`], which reads the
block from the wire, validates it on reception, prepares a copy for each
outgoing link, and regenerates its wire form. The defaults here implement
the generic behaviour; the concrete processors override what differs.
*/

use super::*;
use std::fmt::Write;

mod bpq;
mod cteb;
mod metadata;
mod payload;
mod unknown;

pub use bpq::BpqBlockProcessor;
pub use cteb::CtebBlockProcessor;
pub use metadata::MetadataBlockProcessor;
pub use payload::PayloadBlockProcessor;
pub use unknown::UnknownBlockProcessor;

/// A preamble that has not terminated within this many bytes is rejected.
pub const MAX_PREAMBLE_LEN: usize = 1024;

pub trait BlockProcessor: Send + Sync {
    fn block_type(&self) -> BlockType;

    /// Feeds `buf` into `block`, returning the number of bytes consumed.
    ///
    /// Blocks may arrive in several chunks; once the declared data length has
    /// been received the block is marked complete and [`parse`](Self::parse)
    /// runs once. An `Err` is a fatal protocol error for the whole bundle.
    fn consume(&self, block: &mut BlockInfo, buf: &[u8]) -> Result<usize, Error> {
        let consumed = consume_block(block, buf)?;
        if block.complete {
            self.parse(block);
        }
        Ok(consumed)
    }

    /// Parses the completed block data into its locals, flagging the block as
    /// errored if it is malformed.
    fn parse(&self, _block: &mut BlockInfo) {}

    /// Checks a received block. Returns false if the bundle must be deleted,
    /// with the reasons updated as the block flags request.
    fn validate(
        &self,
        _bundle: &Bundle,
        block: &BlockInfo,
        reception_reason: &mut ReasonCode,
        deletion_reason: &mut ReasonCode,
    ) -> bool {
        if block.error || !block.complete {
            return handle_error(block, reception_reason, deletion_reason);
        }
        true
    }

    /// Adds the block(s) to be sent on `link` for `source`, or the locally
    /// generated block(s) of this type if `source` is `None`.
    fn prepare(
        &self,
        bundle: &Bundle,
        xmit_blocks: &mut Vec<BlockInfo>,
        source: Option<BlockSource>,
        _link: &str,
    ) {
        xmit_blocks.push(prepare_block(self.block_type(), bundle, source));
    }

    /// Writes the wire form of a prepared block into its contents.
    fn generate(
        &self,
        bundle: &Bundle,
        block: &mut BlockInfo,
        dict: &Dictionary,
        _link: &str,
        last: bool,
    ) -> Result<(), Error> {
        let data = block
            .source
            .and_then(|s| bundle.source_block(s))
            .map(|s| s.data().to_vec())
            .unwrap_or_default();
        write_block(block, dict, &data, last)
    }

    fn format(&self, block: &BlockInfo, out: &mut dyn Write) -> std::fmt::Result {
        write!(
            out,
            "Block type {}: {} bytes",
            u8::from(block.block_type),
            block.data_length
        )
    }
}

/// Applies the error handling requested by a block's flags.
///
/// Returns false if the bundle must be deleted.
pub fn handle_error(
    block: &BlockInfo,
    reception_reason: &mut ReasonCode,
    deletion_reason: &mut ReasonCode,
) -> bool {
    if block.flags.report_on_error {
        *reception_reason = ReasonCode::BlockUnintelligible;
    }
    if block.flags.delete_bundle_on_error {
        *deletion_reason = ReasonCode::BlockUnintelligible;
        return false;
    }
    true
}

fn consume_preamble(block: &mut BlockInfo, buf: &[u8]) -> Result<usize, Error> {
    let prev = block.contents.len();
    let take = buf.len().min(MAX_PREAMBLE_LEN - prev);
    block.contents.extend_from_slice(&buf[..take]);

    match block::Preamble::parse(&block.contents) {
        Ok((preamble, len)) => {
            block.contents.truncate(len);
            block.block_type = preamble.block_type;
            block.flags = preamble.flags;
            block.dict_refs = preamble.dict_refs;
            block.data_length = preamble.data_length;
            block.data_offset = len;
            if block.full_length().is_none() {
                return Err(Error::BlockTooLong(preamble.data_length));
            }
            Ok(len - prev)
        }
        Err(Error::InvalidSdnv(sdnv::Error::NotEnoughData))
            if block.contents.len() < MAX_PREAMBLE_LEN =>
        {
            Ok(take)
        }
        Err(Error::InvalidSdnv(sdnv::Error::NotEnoughData)) => Err(Error::PreambleTooLong),
        Err(e) => Err(e),
    }
}

/// The generic incremental consume: preamble first, then data up to the
/// declared length.
pub fn consume_block(block: &mut BlockInfo, buf: &[u8]) -> Result<usize, Error> {
    if block.complete {
        return Ok(0);
    }

    let mut consumed = 0;
    if !block.preamble_complete() {
        consumed = consume_preamble(block, buf)?;
        if !block.preamble_complete() {
            return Ok(consumed);
        }
    }

    let full_length = block
        .full_length()
        .ok_or(Error::BlockTooLong(block.data_length))?;
    let wanted = full_length.saturating_sub(block.contents.len());
    let take = wanted.min(buf.len() - consumed);
    block
        .contents
        .extend_from_slice(&buf[consumed..consumed + take]);
    consumed += take;

    if block.contents.len() == full_length {
        block.complete = true;
    }
    Ok(consumed)
}

/// The generic prepare: a copy of the source block, or a fresh block.
pub fn prepare_block(
    block_type: BlockType,
    bundle: &Bundle,
    source: Option<BlockSource>,
) -> BlockInfo {
    match source {
        Some(source) => BlockInfo::from_source(
            bundle
                .source_block(source)
                .trace_expect("Prepared block has no source"),
            source,
        ),
        None => BlockInfo::new(block_type),
    }
}

/// Writes the preamble for `data_length` bytes of data, leaving the data
/// itself to the caller.
pub fn generate_preamble(
    block: &mut BlockInfo,
    dict: &Dictionary,
    data_length: u64,
    last: bool,
) -> Result<(), Error> {
    block.flags.last_block = last;
    block.flags.eid_refs = !block.eid_refs.is_empty();
    block.dict_refs = block
        .eid_refs
        .iter()
        .map(|eid| {
            dict.offsets(eid)
                .trace_expect("Block endpoint missing from dictionary")
        })
        .collect();

    let preamble = block::Preamble {
        block_type: block.block_type,
        flags: block.flags,
        dict_refs: block.dict_refs.clone(),
        data_length,
    };
    let len = preamble.encoding_len();
    block.contents = vec![0u8; len];
    preamble.write(&mut sdnv::Writer::new(&mut block.contents))?;
    block.data_offset = len;
    block.data_length = data_length;
    block.complete = true;
    Ok(())
}

/// Writes the preamble followed by `data`.
pub fn write_block(
    block: &mut BlockInfo,
    dict: &Dictionary,
    data: &[u8],
    last: bool,
) -> Result<(), Error> {
    generate_preamble(block, dict, data.len() as u64, last)?;
    block.contents.extend_from_slice(data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn chunked_consume() {
        // Metadata block, ontology 1, "abc", last block
        let wire = hex!("08 08 05 01 03 616263");
        let processor = MetadataBlockProcessor::new(MetadataLengthMode::Strict);

        let mut block = BlockInfo::new(BlockType::Metadata);
        let mut offset = 0;
        for chunk in wire.chunks(2) {
            offset += processor.consume(&mut block, chunk).unwrap();
        }
        assert_eq!(offset, wire.len());
        assert!(block.complete);
        assert!(block.flags.last_block);
        assert_eq!(block.data_offset, 3);
        let metadata = block.metadata().unwrap();
        assert_eq!(metadata.ontology, 1);
        assert_eq!(&metadata.data[..], b"abc");
    }

    #[test]
    fn consume_stops_at_block_end() {
        let wire = hex!("08 00 02 01 00 01 00 00");
        let mut block = BlockInfo::new(BlockType::Metadata);
        assert_eq!(consume_block(&mut block, &wire).unwrap(), 5);
        assert!(block.complete);
        assert_eq!(consume_block(&mut block, &wire[5..]).unwrap(), 0);
    }

    #[test]
    fn preamble_too_long() {
        let mut block = BlockInfo::new(BlockType::Metadata);
        // 1024 EID references cannot fit
        let mut wire = vec![0x08, 0x40, 0x88, 0x00];
        wire.resize(MAX_PREAMBLE_LEN + 10, 0);
        assert!(matches!(
            consume_block(&mut block, &wire),
            Err(Error::PreambleTooLong)
        ));
    }

    #[test]
    fn data_length_overflow() {
        // Payload block declaring u64::MAX bytes of data
        let wire = hex!("01 08 81ffffffffffffffff7f 00");
        let mut block = BlockInfo::new(BlockType::Payload);
        assert!(matches!(
            consume_block(&mut block, &wire),
            Err(Error::BlockTooLong(u64::MAX))
        ));

        // The same again, split across the preamble
        let mut block = BlockInfo::new(BlockType::Payload);
        assert_eq!(consume_block(&mut block, &wire[..5]).unwrap(), 5);
        assert!(matches!(
            consume_block(&mut block, &wire[5..]),
            Err(Error::BlockTooLong(u64::MAX))
        ));
    }

    #[test]
    fn error_flags() {
        let mut block = BlockInfo::new(BlockType::Unrecognised(200));
        let mut reception = ReasonCode::default();
        let mut deletion = ReasonCode::default();
        assert!(handle_error(&block, &mut reception, &mut deletion));
        assert_eq!(reception, ReasonCode::NoAdditionalInformation);

        block.flags.report_on_error = true;
        assert!(handle_error(&block, &mut reception, &mut deletion));
        assert_eq!(reception, ReasonCode::BlockUnintelligible);
        assert_eq!(deletion, ReasonCode::NoAdditionalInformation);

        block.flags.delete_bundle_on_error = true;
        assert!(!handle_error(&block, &mut reception, &mut deletion));
        assert_eq!(deletion, ReasonCode::BlockUnintelligible);
    }
}

use super::*;

pub struct MetadataBlockProcessor {
    mode: MetadataLengthMode,
}

impl MetadataBlockProcessor {
    pub fn new(mode: MetadataLengthMode) -> Self {
        Self { mode }
    }

    fn source_metadata<'a>(bundle: &'a Bundle, block: &BlockInfo) -> Option<&'a MetadataBlock> {
        block
            .source
            .and_then(|s| bundle.source_block(s))
            .and_then(BlockInfo::metadata)
    }
}

impl BlockProcessor for MetadataBlockProcessor {
    fn block_type(&self) -> BlockType {
        BlockType::Metadata
    }

    fn parse(&self, block: &mut BlockInfo) {
        let metadata = match MetadataBlock::parse(block.data(), self.mode) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Invalid metadata block: {e}");
                MetadataBlock::errored()
            }
        };
        block.error = metadata.error;
        block.locals = Some(BlockLocals::Metadata(metadata));
    }

    fn validate(
        &self,
        _bundle: &Bundle,
        block: &BlockInfo,
        reception_reason: &mut ReasonCode,
        deletion_reason: &mut ReasonCode,
    ) -> bool {
        if block.error || !block.complete || block.metadata().is_none_or(|m| m.error) {
            debug!("Error in metadata block");
            return handle_error(block, reception_reason, deletion_reason);
        }
        true
    }

    fn prepare(
        &self,
        bundle: &Bundle,
        xmit_blocks: &mut Vec<BlockInfo>,
        source: Option<BlockSource>,
        link: &str,
    ) {
        let Some(source) = source else {
            // Locally generated metadata, for this link or for all links
            for (l, metadata) in &bundle.generated_metadata {
                if l.as_ref().is_some_and(|l| l != link) || metadata.is_removed(link) {
                    continue;
                }
                xmit_blocks.push(BlockInfo {
                    flags: metadata.flags,
                    locals: Some(BlockLocals::Metadata(metadata.clone())),
                    ..BlockInfo::new(BlockType::Metadata)
                });
            }
            return;
        };

        let original = bundle
            .source_block(source)
            .trace_expect("Prepared metadata block has no source");
        if let Some(metadata) = original.metadata() {
            if metadata.error && original.flags.delete_block_on_error {
                return;
            }
            if metadata.is_removed(link) {
                return;
            }
        }
        xmit_blocks.push(prepare_block(self.block_type(), bundle, Some(source)));
    }

    fn generate(
        &self,
        bundle: &Bundle,
        block: &mut BlockInfo,
        dict: &Dictionary,
        link: &str,
        last: bool,
    ) -> Result<(), Error> {
        let (metadata, data) = if let Some(metadata) = block.metadata() {
            (metadata.clone(), metadata.data.clone())
        } else {
            let original = block
                .source
                .and_then(|s| bundle.source_block(s))
                .trace_expect("Metadata block has neither source nor locals");
            match Self::source_metadata(bundle, block)
                .and_then(|m| m.modified_for(link).map(|d| (m.clone(), d.clone())))
            {
                Some(modified) => modified,
                None => {
                    // Unmodified received blocks go out verbatim
                    let data = original.data().to_vec();
                    return write_block(block, dict, &data, last);
                }
            }
        };

        let mut buf = vec![0u8; metadata.encoding_len(&data)];
        metadata.write(&data, &mut sdnv::Writer::new(&mut buf))?;
        write_block(block, dict, &buf, last)
    }

    fn format(&self, block: &BlockInfo, out: &mut dyn Write) -> std::fmt::Result {
        out.write_str("Metadata: ")?;
        for b in block.data().iter().take(10) {
            out.write_char((b & 0x7F) as char)?;
        }
        Ok(())
    }
}

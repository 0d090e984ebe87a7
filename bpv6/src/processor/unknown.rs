use super::*;

/// Handles every block type with no registered processor.
///
/// Such blocks cannot be processed, so validation always applies the error
/// flags, and forwarded copies are marked as forwarded without processing.
#[derive(Default)]
pub struct UnknownBlockProcessor;

impl BlockProcessor for UnknownBlockProcessor {
    fn block_type(&self) -> BlockType {
        BlockType::Unrecognised(0)
    }

    fn validate(
        &self,
        _bundle: &Bundle,
        block: &BlockInfo,
        reception_reason: &mut ReasonCode,
        deletion_reason: &mut ReasonCode,
    ) -> bool {
        debug!("Unprocessable block of type {}", u8::from(block.block_type));
        handle_error(block, reception_reason, deletion_reason)
    }

    fn prepare(
        &self,
        bundle: &Bundle,
        xmit_blocks: &mut Vec<BlockInfo>,
        source: Option<BlockSource>,
        _link: &str,
    ) {
        let Some(source) = source else {
            return;
        };
        let mut block = prepare_block(self.block_type(), bundle, Some(source));
        if block.flags.delete_block_on_error {
            debug!(
                "Dropping unprocessable block of type {}",
                u8::from(block.block_type)
            );
            return;
        }
        block.flags.forwarded_unprocessed = true;
        xmit_blocks.push(block);
    }
}

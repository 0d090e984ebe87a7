use super::*;

/// The payload block. Its data lives in the bundle, so transmit blocks hold
/// only the preamble.
#[derive(Default)]
pub struct PayloadBlockProcessor;

impl BlockProcessor for PayloadBlockProcessor {
    fn block_type(&self) -> BlockType {
        BlockType::Payload
    }

    fn generate(
        &self,
        bundle: &Bundle,
        block: &mut BlockInfo,
        dict: &Dictionary,
        _link: &str,
        last: bool,
    ) -> Result<(), Error> {
        generate_preamble(block, dict, bundle.payload.len() as u64, last)
    }

    fn format(&self, block: &BlockInfo, out: &mut dyn Write) -> std::fmt::Result {
        write!(out, "Payload: {} bytes", block.data_length)
    }
}

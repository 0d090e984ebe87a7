use super::*;

#[derive(Default)]
pub struct BpqBlockProcessor;

impl BlockProcessor for BpqBlockProcessor {
    fn block_type(&self) -> BlockType {
        BlockType::QueryExtension
    }

    fn parse(&self, block: &mut BlockInfo) {
        match BpqBlock::parse(block.data()) {
            Ok(bpq) => {
                debug!(
                    "BPQ block: kind {}, query length {}",
                    bpq.kind,
                    bpq.query.len()
                );
                block.locals = Some(BlockLocals::Bpq(bpq));
            }
            Err(e) => {
                warn!("Invalid BPQ block: {e}");
                block.error = true;
            }
        }
    }

    fn validate(
        &self,
        _bundle: &Bundle,
        block: &BlockInfo,
        reception_reason: &mut ReasonCode,
        deletion_reason: &mut ReasonCode,
    ) -> bool {
        if block.error || !block.complete || block.bpq().is_none() {
            return handle_error(block, reception_reason, deletion_reason);
        }
        true
    }

    fn generate(
        &self,
        bundle: &Bundle,
        block: &mut BlockInfo,
        dict: &Dictionary,
        _link: &str,
        last: bool,
    ) -> Result<(), Error> {
        let data = match (&block.source, block.bpq()) {
            (None, Some(bpq)) => bpq.to_vec(),
            _ => block
                .source
                .and_then(|s| bundle.source_block(s))
                .map(|s| s.data().to_vec())
                .unwrap_or_default(),
        };
        write_block(block, dict, &data, last)
    }

    fn format(&self, block: &BlockInfo, out: &mut dyn Write) -> std::fmt::Result {
        BpqBlock::format(block.data(), out)
    }
}

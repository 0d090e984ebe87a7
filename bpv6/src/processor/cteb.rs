use super::*;

/// The custody transfer enhancement block.
///
/// A received block is only meaningful while its creator is still the
/// custodian, so it is forwarded only if this node has not taken custody.
/// When this node holds custody with a custody id it generates its own.
#[derive(Default)]
pub struct CtebBlockProcessor;

impl BlockProcessor for CtebBlockProcessor {
    fn block_type(&self) -> BlockType {
        BlockType::CustodyTransferEnhancement
    }

    fn parse(&self, block: &mut BlockInfo) {
        match Cteb::parse(block.data()) {
            Ok(cteb) => block.locals = Some(BlockLocals::Cteb(cteb)),
            Err(e) => {
                warn!("Invalid CTEB: {e}");
                block.error = true;
            }
        }
    }

    fn prepare(
        &self,
        bundle: &Bundle,
        xmit_blocks: &mut Vec<BlockInfo>,
        source: Option<BlockSource>,
        _link: &str,
    ) {
        match source {
            Some(_) if bundle.local_custody => {}
            Some(source) => xmit_blocks.push(prepare_block(self.block_type(), bundle, Some(source))),
            None if bundle.local_custody && bundle.custody_id > 0 => {
                xmit_blocks.push(BlockInfo::new(self.block_type()))
            }
            None => {}
        }
    }

    fn generate(
        &self,
        bundle: &Bundle,
        block: &mut BlockInfo,
        dict: &Dictionary,
        _link: &str,
        last: bool,
    ) -> Result<(), Error> {
        let data = match block.source.and_then(|s| bundle.source_block(s)) {
            Some(original) => original.data().to_vec(),
            None => {
                let cteb = Cteb {
                    custody_id: bundle.custody_id,
                    creator: bundle.custodian.clone(),
                };
                let mut buf = vec![0u8; cteb.encoding_len()];
                cteb.write(&mut sdnv::Writer::new(&mut buf))?;
                buf
            }
        };
        write_block(block, dict, &data, last)
    }

    fn format(&self, block: &BlockInfo, out: &mut dyn Write) -> std::fmt::Result {
        match block.cteb() {
            Some(cteb) => write!(
                out,
                "CTEB: custody id {}, creator {}",
                cteb.custody_id, cteb.creator
            ),
            None => out.write_str("CTEB: (unparsed)"),
        }
    }
}

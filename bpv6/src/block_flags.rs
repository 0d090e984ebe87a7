#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlockFlags {
    pub must_replicate: bool,
    pub report_on_error: bool,
    pub delete_bundle_on_error: bool,
    pub last_block: bool,
    pub delete_block_on_error: bool,
    pub forwarded_unprocessed: bool,
    pub eid_refs: bool,
    pub unrecognised: u64,
}

impl From<BlockFlags> for u64 {
    fn from(value: BlockFlags) -> Self {
        let mut flags = value.unrecognised;
        if value.must_replicate {
            flags |= 1 << 0;
        }
        if value.report_on_error {
            flags |= 1 << 1;
        }
        if value.delete_bundle_on_error {
            flags |= 1 << 2;
        }
        if value.last_block {
            flags |= 1 << 3;
        }
        if value.delete_block_on_error {
            flags |= 1 << 4;
        }
        if value.forwarded_unprocessed {
            flags |= 1 << 5;
        }
        if value.eid_refs {
            flags |= 1 << 6;
        }
        flags
    }
}

impl From<u64> for BlockFlags {
    fn from(value: u64) -> Self {
        Self {
            must_replicate: value & (1 << 0) != 0,
            report_on_error: value & (1 << 1) != 0,
            delete_bundle_on_error: value & (1 << 2) != 0,
            last_block: value & (1 << 3) != 0,
            delete_block_on_error: value & (1 << 4) != 0,
            forwarded_unprocessed: value & (1 << 5) != 0,
            eid_refs: value & (1 << 6) != 0,
            unrecognised: value & !0x7F,
        }
    }
}

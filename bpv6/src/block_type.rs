#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlockType {
    /// Never appears on the wire as a block type code.
    Primary,
    Payload,
    BundleAuthentication,
    PayloadIntegrity,
    PayloadConfidentiality,
    PreviousHop,
    Metadata,
    ExtensionSecurity,
    CustodyTransferEnhancement,
    QueryExtension,
    Unrecognised(u8),
}

impl From<BlockType> for u8 {
    fn from(value: BlockType) -> Self {
        match value {
            BlockType::Primary => 0,
            BlockType::Payload => 1,
            BlockType::BundleAuthentication => 2,
            BlockType::PayloadIntegrity => 3,
            BlockType::PayloadConfidentiality => 4,
            BlockType::PreviousHop => 5,
            BlockType::Metadata => 8,
            BlockType::ExtensionSecurity => 9,
            BlockType::CustodyTransferEnhancement => 10,
            BlockType::QueryExtension => 11,
            BlockType::Unrecognised(v) => v,
        }
    }
}

impl From<u8> for BlockType {
    fn from(value: u8) -> Self {
        match value {
            0 => BlockType::Primary,
            1 => BlockType::Payload,
            2 => BlockType::BundleAuthentication,
            3 => BlockType::PayloadIntegrity,
            4 => BlockType::PayloadConfidentiality,
            5 => BlockType::PreviousHop,
            8 => BlockType::Metadata,
            9 => BlockType::ExtensionSecurity,
            10 => BlockType::CustodyTransferEnhancement,
            11 => BlockType::QueryExtension,
            value => BlockType::Unrecognised(value),
        }
    }
}

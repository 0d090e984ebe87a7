use hardy_sdnv as sdnv;
use trace_err::*;
use tracing::*;

mod admin_record;
mod aggregate_custody_signal;
mod block;
mod block_flags;
mod block_type;
mod bpq_block;
mod bundle;
mod bundle_flags;
mod bundle_id;
mod creation_timestamp;
mod cteb;
mod custody_signal;
mod dictionary;
mod dtn_time;
mod eid;
mod error;
mod metadata_block;
mod primary_block;
mod status_report;

pub mod processor;
pub mod protocol;

#[cfg(test)]
mod admin_record_tests;

#[cfg(test)]
mod primary_block_tests;

pub mod prelude {
    pub use super::admin_record::{AdminRecordType, AdministrativeRecord};
    pub use super::aggregate_custody_signal::{AcsFill, AggregateCustodySignal};
    pub use super::block::{BlockInfo, BlockLocals, BlockSource};
    pub use super::block_flags::BlockFlags;
    pub use super::block_type::BlockType;
    pub use super::bpq_block::{BpqBlock, BpqFragment, BpqKind};
    pub use super::bundle::Bundle;
    pub use super::bundle_flags::{BundleFlags, Priority};
    pub use super::bundle_id::{BundleId, FragmentInfo};
    pub use super::creation_timestamp::CreationTimestamp;
    pub use super::cteb::Cteb;
    pub use super::custody_signal::{CustodyReason, CustodySignal};
    pub use super::dictionary::Dictionary;
    pub use super::dtn_time::DtnTime;
    pub use super::eid::{Eid, EidError, EidPattern};
    pub use super::error::{CaptureFieldErr, Error};
    pub use super::metadata_block::{MetadataBlock, MetadataLengthMode};
    pub use super::protocol::BundleProtocol;
    pub use super::status_report::{ReasonCode, StatusFlag, StatusReport};
}

use prelude::*;

/*!
This module defines the primary error type for the `bpv6` crate.

Every wire parsing failure, whether in a block preamble, a primary block or an
administrative record, is reported through [`Error`].
*/

use super::*;
use thiserror::Error;

/// The primary error type for the `bpv6` crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A self-delimiting numeric value could not be decoded or encoded.
    #[error(transparent)]
    InvalidSdnv(#[from] sdnv::Error),

    /// An endpoint identifier failed to parse.
    #[error(transparent)]
    InvalidEid(#[from] EidError),

    /// The primary block carries an unsupported version number.
    #[error("Unsupported bundle protocol version {0}")]
    InvalidVersion(u8),

    /// A dictionary offset points outside the dictionary.
    #[error("Dictionary offset {0} is out of range")]
    InvalidDictionaryOffset(u64),

    /// A declared length disagrees with the bytes actually present.
    #[error("Declared length {declared} does not match the {actual} bytes available")]
    LengthMismatch { declared: u64, actual: usize },

    /// A block declares more data than can be addressed.
    #[error("Block data length {0} is too large")]
    BlockTooLong(u64),

    /// Extra bytes follow the end of a record or block.
    #[error("{0} bytes of additional data after the end of the record")]
    AdditionalData(usize),

    /// A block preamble did not terminate within a sane number of bytes.
    #[error("Block preamble is too long")]
    PreambleTooLong,

    /// The bundle has no payload block.
    #[error("Bundle has no payload block")]
    MissingPayload,

    /// The administrative record type nibble is not one we understand.
    #[error("Invalid administrative record type {0}")]
    InvalidAdminType(u8),

    /// A BPQ block carries an unknown kind.
    #[error("Invalid BPQ kind {0}")]
    InvalidBpqKind(u8),

    /// A BPQ block carries an unknown matching rule.
    #[error("Invalid BPQ matching rule {0}")]
    InvalidMatchingRule(u8),

    /// An aggregate custody signal has no fills.
    #[error("Aggregate custody signal contains no fills")]
    NoAcsFills,

    /// An aggregate custody signal fill is empty, starts at zero, or overflows.
    #[error("Invalid aggregate custody signal fill")]
    InvalidAcsFill,

    /// A field failed to parse.
    #[error("Failed to parse {field}: {source}")]
    InvalidField {
        field: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub trait CaptureFieldErr<T> {
    fn map_field_err(self, field: &'static str) -> Result<T, Error>;
}

impl<T, E: Into<Box<dyn std::error::Error + Send + Sync>>> CaptureFieldErr<T>
    for std::result::Result<T, E>
{
    fn map_field_err(self, field: &'static str) -> Result<T, Error> {
        self.map_err(|e| Error::InvalidField {
            field,
            source: e.into(),
        })
    }
}

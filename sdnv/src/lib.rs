#![no_std]
extern crate alloc;

pub mod cursor;
pub mod decode;
pub mod encode;


#[cfg(test)]
mod encode_tests;

pub use cursor::{Reader, Writer};
pub use decode::{decode, len};
pub use encode::{emit, encode, encoding_len};

/// The longest encoding of a `u64`: 64 bits spread over 7-bit groups.
pub const MAX_LENGTH: usize = 10;

#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Not enough data for encoded value")]
    NotEnoughData,

    #[error("Encoded value does not fit in 64 bits")]
    Overflow,

    #[error("Buffer too small: {needed} bytes needed, {available} available")]
    BufferTooSmall { needed: usize, available: usize },
}

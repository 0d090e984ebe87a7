use super::*;
use alloc::vec::Vec;

/// Number of bytes needed to encode `value`.
pub fn encoding_len(mut value: u64) -> usize {
    let mut len = 1;
    while value > 0x7F {
        value >>= 7;
        len += 1;
    }
    len
}

/// Encodes `value` into the front of `buf`, returning the number of bytes written.
///
/// Groups of 7 bits are written most significant first, with the high bit set
/// on every byte except the last.
pub fn encode(value: u64, buf: &mut [u8]) -> Result<usize, Error> {
    let len = encoding_len(value);
    if buf.len() < len {
        return Err(Error::BufferTooSmall {
            needed: len,
            available: buf.len(),
        });
    }

    let mut value = value;
    for (idx, b) in buf[..len].iter_mut().enumerate().rev() {
        *b = (value & 0x7F) as u8;
        if idx != len - 1 {
            *b |= 0x80;
        }
        value >>= 7;
    }
    Ok(len)
}

pub fn emit(value: u64) -> Vec<u8> {
    let mut data = alloc::vec![0u8; encoding_len(value)];
    // The buffer is sized exactly, so this cannot fail
    let _ = encode(value, &mut data);
    data
}

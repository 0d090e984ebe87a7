use super::*;

/// Decodes one SDNV from the front of `buf`, returning the value and the
/// number of bytes read.
pub fn decode(buf: &[u8]) -> Result<(u64, usize), Error> {
    let mut value = 0u64;
    for (idx, b) in buf.iter().enumerate() {
        value = (value << 7) | (b & 0x7F) as u64;

        if b & 0x80 == 0 {
            // A 10 byte encoding only has room for a single data bit in the first byte
            if idx + 1 == MAX_LENGTH && buf[0] != 0x81 {
                return Err(Error::Overflow);
            }
            return Ok((value, idx + 1));
        }

        if idx + 1 == MAX_LENGTH {
            return Err(Error::Overflow);
        }
    }
    Err(Error::NotEnoughData)
}

/// Length of the already-validated SDNV at the front of `buf`.
///
/// Used to skip a field without decoding it.  An unterminated buffer
/// reports its full length.
pub fn len(buf: &[u8]) -> usize {
    buf.iter()
        .position(|b| b & 0x80 == 0)
        .map_or(buf.len(), |p| p + 1)
}

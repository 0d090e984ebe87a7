//! Bounds-checked cursors over byte buffers.
//!
//! Block and record codecs size their output up front and then fill it
//! through a [`Writer`], and parse through a [`Reader`], so every overrun
//! surfaces as an [`Error`] rather than an out-of-bounds access.

use super::*;

pub struct Writer<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), Error> {
        if self.remaining() == 0 {
            return Err(Error::BufferTooSmall {
                needed: 1,
                available: 0,
            });
        }
        self.buf[self.offset] = value;
        self.offset += 1;
        Ok(())
    }

    pub fn write_sdnv(&mut self, value: u64) -> Result<usize, Error> {
        let len = encode(value, &mut self.buf[self.offset..])?;
        self.offset += len;
        Ok(len)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.remaining() < data.len() {
            return Err(Error::BufferTooSmall {
                needed: data.len(),
                available: self.remaining(),
            });
        }
        self.buf[self.offset..self.offset + data.len()].copy_from_slice(data);
        self.offset += data.len();
        Ok(())
    }
}

pub struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// The unread tail of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.offset..]
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        let b = *self.buf.get(self.offset).ok_or(Error::NotEnoughData)?;
        self.offset += 1;
        Ok(b)
    }

    pub fn read_sdnv(&mut self) -> Result<u64, Error> {
        let (value, len) = decode(&self.buf[self.offset..])?;
        self.offset += len;
        Ok(value)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(Error::NotEnoughData);
        }
        let data = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(data)
    }

    /// Reads `len` bytes, where `len` came off the wire as an SDNV.
    pub fn read_counted(&mut self, len: u64) -> Result<&'a [u8], Error> {
        self.read_bytes(usize::try_from(len).map_err(|_| Error::NotEnoughData)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_overrun() {
        let mut buf = [0u8; 3];
        let mut w = Writer::new(&mut buf);
        w.write_u8(0x20).unwrap();
        assert_eq!(w.write_sdnv(0x80).unwrap(), 2);
        assert_eq!(w.remaining(), 0);
        assert_eq!(
            w.write_u8(1),
            Err(Error::BufferTooSmall {
                needed: 1,
                available: 0
            })
        );
        assert_eq!(buf, [0x20, 0x81, 0x00]);
    }

    #[test]
    fn writer_sdnv_does_not_fit() {
        let mut buf = [0u8; 2];
        let mut w = Writer::new(&mut buf);
        w.write_u8(0).unwrap();
        assert!(w.write_sdnv(0x4000).is_err());
        assert_eq!(w.position(), 1);
        assert!(w.write_bytes(b"ab").is_err());
        w.write_bytes(b"a").unwrap();
    }

    #[test]
    fn reader_sequence() {
        let data = [0x41, 0x81, 0x00, b'a', b'b', b'c'];
        let mut r = Reader::new(&data);
        assert_eq!(r.read_u8().unwrap(), 0x41);
        assert_eq!(r.read_sdnv().unwrap(), 0x80);
        assert_eq!(r.read_bytes(2).unwrap(), b"ab");
        assert_eq!(r.rest(), b"c");
        assert_eq!(r.read_bytes(2), Err(Error::NotEnoughData));
        assert_eq!(r.read_u8().unwrap(), b'c');
        assert_eq!(r.read_u8(), Err(Error::NotEnoughData));
        assert_eq!(r.read_sdnv(), Err(Error::NotEnoughData));
    }
}

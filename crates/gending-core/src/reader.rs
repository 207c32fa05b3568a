//! Bounds-checked cursor over a borrowed byte buffer.
//!
//! Little-endian decoders for RIFF sound banks.

use crate::error::{Error, Result};

/// Cursor over a byte slice. Reads never panic; running past the end
/// returns [`Error::UnexpectedEof`] and leaves the cursor where it was.
#[derive(Debug, Clone, Copy)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True once every byte has been consumed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::UnexpectedEof {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.take_array().map(u16::from_le_bytes)
    }

    pub fn read_i16_le(&mut self) -> Result<i16> {
        self.take_array().map(i16::from_le_bytes)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    pub fn read_fourcc(&mut self) -> Result<[u8; 4]> {
        self.take_array()
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Fixed-width, NUL-padded string field. Bytes after the first NUL are
    /// ignored and invalid UTF-8 is replaced.
    pub fn read_fixed_string(&mut self, n: usize) -> Result<String> {
        let raw = self.take(n)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).trim_end().to_string())
    }

    /// Split off the next `n` bytes as an independent reader and advance past them.
    pub fn sub_reader(&mut self, n: usize) -> Result<BinaryReader<'a>> {
        self.take(n).map(BinaryReader::new)
    }

    /// The unread tail of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_little_endian() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut r = BinaryReader::new(&data);
        assert_eq!(r.read_u16_le().unwrap(), 0x1234);
        assert_eq!(r.read_u32_le().unwrap(), 0x1234_5678);
        assert!(r.is_empty());
    }

    #[test]
    fn test_signed_values() {
        let data = [0xFF, 0xFE, 0xFF];
        let mut r = BinaryReader::new(&data);
        assert_eq!(r.read_i8().unwrap(), -1);
        assert_eq!(r.read_i16_le().unwrap(), -2);
    }

    #[test]
    fn test_eof_does_not_advance() {
        let data = [1, 2, 3];
        let mut r = BinaryReader::new(&data);
        r.read_u8().unwrap();
        let err = r.read_u32_le().unwrap_err();
        assert_eq!(
            err,
            Error::UnexpectedEof {
                offset: 1,
                needed: 4,
                available: 2
            }
        );
        assert_eq!(r.position(), 1);
    }

    #[test]
    fn test_fixed_string_stops_at_nul() {
        let data = *b"Gong\0\0xx";
        let mut r = BinaryReader::new(&data);
        assert_eq!(r.read_fixed_string(8).unwrap(), "Gong");
        assert!(r.is_empty());
    }

    #[test]
    fn test_sub_reader() {
        let data = [1, 2, 3, 4, 5];
        let mut r = BinaryReader::new(&data);
        let mut sub = r.sub_reader(3).unwrap();
        assert_eq!(sub.rest(), &[1, 2, 3]);
        assert_eq!(sub.read_u8().unwrap(), 1);
        assert_eq!(r.read_u8().unwrap(), 4);
    }

    proptest! {
        #[test]
        fn prop_reads_never_overrun(data in proptest::collection::vec(any::<u8>(), 0..64), n in 0usize..80) {
            let mut r = BinaryReader::new(&data);
            r.read_u8().ok();
            let before = r.position();
            match r.read_bytes(n) {
                Ok(bytes) => {
                    prop_assert_eq!(bytes.len(), n);
                    prop_assert_eq!(r.position(), before + n);
                }
                Err(_) => {
                    prop_assert!(n > data.len() - before);
                    prop_assert_eq!(r.position(), before);
                }
            }
        }
    }
}

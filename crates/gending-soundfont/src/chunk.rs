//! RIFF chunk walking.

use crate::error::{FormatError, Result};
use gending_core::BinaryReader;

pub(crate) const RIFF: [u8; 4] = *b"RIFF";
pub(crate) const LIST: [u8; 4] = *b"LIST";

/// One tagged chunk borrowed from the source buffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Chunk<'a> {
    pub id: [u8; 4],
    pub data: &'a [u8],
}

impl<'a> Chunk<'a> {
    pub fn tag(&self) -> String {
        tag_name(&self.id)
    }

    /// For `RIFF`/`LIST` chunks: the form type and the nested chunk area.
    pub fn form(&self) -> Result<([u8; 4], &'a [u8])> {
        let mut r = BinaryReader::new(self.data);
        let form = r.read_fourcc().map_err(|_| FormatError::InvalidChunkSize {
            tag: self.tag(),
            size: self.data.len(),
        })?;
        Ok((form, r.rest()))
    }

    /// Split a fixed-record table chunk, checking the size is a whole
    /// number of records.
    pub fn records(&self, record_size: usize) -> Result<std::slice::Chunks<'a, u8>> {
        if self.data.len() % record_size != 0 {
            return Err(FormatError::InvalidChunkSize {
                tag: self.tag(),
                size: self.data.len(),
            });
        }
        Ok(self.data.chunks(record_size))
    }
}

pub(crate) fn tag_name(id: &[u8; 4]) -> String {
    String::from_utf8_lossy(id).into_owned()
}

pub(crate) fn read_chunk<'a>(r: &mut BinaryReader<'a>) -> Result<Chunk<'a>> {
    let id = r.read_fourcc()?;
    let size = r.read_u32_le()? as usize;
    if size > r.remaining() {
        return Err(FormatError::InvalidChunkSize {
            tag: tag_name(&id),
            size,
        });
    }
    let data = r.read_bytes(size)?;
    // word alignment pad
    if size % 2 == 1 && !r.is_empty() {
        r.skip(1)?;
    }
    Ok(Chunk { id, data })
}

/// Iterator over the consecutive chunks in `data`.
pub(crate) struct Chunks<'a> {
    reader: BinaryReader<'a>,
    failed: bool,
}

impl<'a> Chunks<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            reader: BinaryReader::new(data),
            failed: false,
        }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        // fewer than 8 bytes left is trailing padding, not a chunk
        if self.failed || self.reader.remaining() < 8 {
            return None;
        }
        let chunk = read_chunk(&mut self.reader);
        self.failed = chunk.is_err();
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walks_padded_chunks() {
        let mut data = Vec::new();
        data.extend_from_slice(b"abcd");
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(&[1, 2, 3, 0]);
        data.extend_from_slice(b"efgh");
        data.extend_from_slice(&2u32.to_le_bytes());
        data.extend_from_slice(&[4, 5]);

        let chunks: Vec<_> = Chunks::new(&data).collect::<Result<_>>().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(&chunks[0].id, b"abcd");
        assert_eq!(chunks[0].data, &[1, 2, 3]);
        assert_eq!(chunks[1].data, &[4, 5]);
    }

    #[test]
    fn test_oversized_chunk_is_error() {
        let mut data = Vec::new();
        data.extend_from_slice(b"phdr");
        data.extend_from_slice(&100u32.to_le_bytes());
        data.extend_from_slice(&[0; 10]);
        let err = Chunks::new(&data).next().unwrap().unwrap_err();
        assert!(matches!(err, FormatError::InvalidChunkSize { size: 100, .. }));
    }

    #[test]
    fn test_records_checks_size() {
        let data = [0u8; 10];
        let chunk = Chunk {
            id: *b"pbag",
            data: &data,
        };
        assert!(chunk.records(4).is_err());
        assert_eq!(chunk.records(5).unwrap().count(), 2);
    }
}

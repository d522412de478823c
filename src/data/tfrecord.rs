//! TFRecord framing
//!
//! Each record is `len: u64 LE | masked_crc(len): u32 LE | data | masked_crc(data): u32 LE`.
//! Records are handed out as zero-copy `Bytes` slices of the file buffer.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::path::Path;
use tracing::debug;

use crate::error::{LaError, Result};

const LENGTH_BYTES: usize = 8;
const CRC_BYTES: usize = 4;
const HEADER_BYTES: usize = LENGTH_BYTES + CRC_BYTES;
const MASK_DELTA: u32 = 0xa282_ead8;

/// Masked CRC32C as used by the TFRecord format
pub fn masked_crc32c(data: &[u8]) -> u32 {
    let crc = crc32c::crc32c(data);
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Iterator over the records of an in-memory TFRecord file
#[derive(Debug, Clone)]
pub struct RecordReader {
    data: Bytes,
    offset: usize,
    verify_checksums: bool,
    failed: bool,
}

impl RecordReader {
    /// Create a reader over a full file buffer
    pub fn new(data: Bytes) -> Self {
        Self {
            data,
            offset: 0,
            verify_checksums: true,
            failed: false,
        }
    }

    /// Read a file from disk and wrap it
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| LaError::io(path, e))?;
        debug!("Opened {} ({} bytes)", path.display(), data.len());
        Ok(Self::new(Bytes::from(data)))
    }

    /// Enable or disable CRC verification
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Current byte offset in the buffer
    pub fn offset(&self) -> u64 {
        self.offset as u64
    }

    fn read_record(&mut self) -> Result<Bytes> {
        let start = self.offset;
        let remaining = &self.data[start..];
        if remaining.len() < HEADER_BYTES {
            return Err(LaError::TruncatedRecord { offset: start as u64 });
        }

        let mut header = &remaining[..HEADER_BYTES];
        let len_bytes = &remaining[..LENGTH_BYTES];
        let length = header.get_u64_le();
        let length_crc = header.get_u32_le();

        if self.verify_checksums {
            let actual = masked_crc32c(len_bytes);
            if actual != length_crc {
                return Err(LaError::ChecksumMismatch {
                    offset: start as u64,
                    expected: length_crc,
                    actual,
                });
            }
        }

        let length = usize::try_from(length)
            .map_err(|_| LaError::TruncatedRecord { offset: start as u64 })?;
        let data_start = start + HEADER_BYTES;
        let data_end = data_start
            .checked_add(length)
            .filter(|end| end.saturating_add(CRC_BYTES) <= self.data.len())
            .ok_or(LaError::TruncatedRecord { offset: start as u64 })?;

        let payload = self.data.slice(data_start..data_end);
        let data_crc = (&self.data[data_end..data_end + CRC_BYTES]).get_u32_le();

        if self.verify_checksums {
            let actual = masked_crc32c(&payload);
            if actual != data_crc {
                return Err(LaError::ChecksumMismatch {
                    offset: start as u64,
                    expected: data_crc,
                    actual,
                });
            }
        }

        self.offset = data_end + CRC_BYTES;
        Ok(payload)
    }
}

impl Iterator for RecordReader {
    type Item = Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }
        match self.read_record() {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                // Framing is lost after a bad header, so stop here.
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Count the records in a buffer, validating framing
pub fn count_records(data: Bytes) -> Result<usize> {
    let mut count = 0;
    for record in RecordReader::new(data) {
        record?;
        count += 1;
    }
    Ok(count)
}

/// Appends framed records to an in-memory buffer
#[derive(Debug, Default)]
pub struct RecordWriter {
    buf: BytesMut,
    records: usize,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame and append one record
    pub fn write(&mut self, record: &[u8]) {
        let len = (record.len() as u64).to_le_bytes();
        self.buf.reserve(HEADER_BYTES + record.len() + CRC_BYTES);
        self.buf.put_slice(&len);
        self.buf.put_u32_le(masked_crc32c(&len));
        self.buf.put_slice(record);
        self.buf.put_u32_le(masked_crc32c(record));
        self.records += 1;
    }

    /// Records written so far
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Take the framed bytes
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    /// Write the framed bytes to a file
    pub async fn write_to(self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let records = self.records;
        tokio::fs::write(path, self.finish())
            .await
            .map_err(|e| LaError::io(path, e))?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> Bytes {
        let mut writer = RecordWriter::new();
        writer.write(b"first");
        writer.write(b"");
        writer.write(&[7u8; 300]);
        writer.finish()
    }

    #[test]
    fn test_masked_crc_known_value() {
        // Masked CRC32C of an empty buffer: crc32c("") == 0.
        assert_eq!(masked_crc32c(b""), MASK_DELTA);
    }

    #[test]
    fn test_read_records() {
        let records: Vec<Bytes> = RecordReader::new(sample_file())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].as_ref(), b"first");
        assert!(records[1].is_empty());
        assert_eq!(records[2].len(), 300);
    }

    #[test]
    fn test_truncated_file() {
        let data = sample_file();
        let cut = data.slice(..data.len() - 2);
        let results: Vec<_> = RecordReader::new(cut).collect();
        assert_eq!(results.len(), 3);
        assert!(matches!(results[2], Err(LaError::TruncatedRecord { .. })));
    }

    #[test]
    fn test_corrupt_payload_detected() {
        let mut data = BytesMut::from(sample_file().as_ref());
        data[HEADER_BYTES] ^= 0xff;
        let mut reader = RecordReader::new(data.clone().freeze());
        let err = reader.next().unwrap().unwrap_err();
        assert!(err.is_corruption());
        assert!(reader.next().is_none());

        let unchecked = RecordReader::new(data.freeze()).verify_checksums(false);
        assert_eq!(unchecked.count(), 3);
    }

    #[test]
    fn test_count_records() {
        assert_eq!(count_records(sample_file()).unwrap(), 3);
        assert_eq!(count_records(Bytes::new()).unwrap(), 0);
    }
}

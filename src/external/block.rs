// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Compression codec and on-disk block metadata.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use xxhash_rust::xxh3::xxh3_128;

/// Compression codec applied to each on-disk column block.
///
/// Only zstd and an identity codec are offered: zstd is the codec used for
/// spilled blocks. `None` is kept for tests and for callers who never spill
/// (e.g. small scratch tables) and would rather skip the codec entirely
/// than pay for a level-1 round trip.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompressionType {
    /// No compression.
    None,
    /// zstd at the given level (1-22).
    Zstd(i32),
}

impl CompressionType {
    /// Compresses `data`, the raw little-endian bytes of one column block.
    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Zstd(level) => zstd::bulk::compress(data, level).map_err(Error::Io),
        }
    }

    /// Decompresses `data` into exactly `uncompressed_size` bytes.
    pub fn decompress(self, data: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Zstd(_) => zstd::bulk::decompress(data, uncompressed_size).map_err(Error::Io),
        }
    }
}

impl Encode for CompressionType {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        match self {
            Self::None => writer.write_u8(0)?,
            Self::Zstd(level) => {
                writer.write_u8(1)?;
                writer.write_i32::<LittleEndian>(*level)?;
            }
        }
        Ok(())
    }
}

impl Decode for CompressionType {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        match reader.read_u8()? {
            0 => Ok(Self::None),
            1 => Ok(Self::Zstd(reader.read_i32::<LittleEndian>()?)),
            tag => Err(DecodeError::InvalidTag("CompressionType", tag)),
        }
    }
}

/// Metadata for one compressed block: its location and sizes within the
/// backing file, plus an xxh3-128 checksum of the compressed payload so a
/// torn or corrupted write is caught on read rather than silently
/// decompressed into garbage.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockMetadata {
    /// Size of the compressed payload, in bytes.
    pub compressed_size: u64,
    /// Size of the decompressed payload, in bytes.
    pub uncompressed_size: u64,
    /// Byte offset of the compressed payload within the backing file.
    pub offset: u64,
    /// xxh3-128 checksum of the compressed payload.
    pub checksum: u128,
}

impl BlockMetadata {
    /// Computes the checksum of a compressed block's bytes.
    #[must_use]
    pub fn checksum_of(compressed: &[u8]) -> u128 {
        xxh3_128(compressed)
    }

    /// Verifies `compressed` against the stored checksum.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChecksumMismatch`] if the computed checksum does
    /// not match the one recorded for this block.
    pub fn verify(&self, compressed: &[u8]) -> Result<()> {
        let actual = Self::checksum_of(compressed);
        if actual == self.checksum {
            Ok(())
        } else {
            Err(Error::ChecksumMismatch { expected: self.checksum, actual })
        }
    }
}

impl Encode for BlockMetadata {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u64::<LittleEndian>(self.compressed_size)?;
        writer.write_u64::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u64::<LittleEndian>(self.offset)?;
        writer.write_u128::<LittleEndian>(self.checksum)?;
        Ok(())
    }
}

impl Decode for BlockMetadata {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self {
            compressed_size: reader.read_u64::<LittleEndian>()?,
            uncompressed_size: reader.read_u64::<LittleEndian>()?,
            offset: reader.read_u64::<LittleEndian>()?,
            checksum: reader.read_u128::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn zstd_round_trips() {
        let data: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
        let compressed = CompressionType::Zstd(3).compress(&data).unwrap();
        let decompressed = CompressionType::Zstd(3).decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn none_is_a_no_op() {
        let data = vec![1, 2, 3, 4];
        let compressed = CompressionType::None.compress(&data).unwrap();
        assert_eq!(compressed, data);
        let decompressed = CompressionType::None.decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn block_metadata_encode_decode_round_trip() {
        let meta = BlockMetadata {
            compressed_size: 123,
            uncompressed_size: 456,
            offset: 789,
            checksum: BlockMetadata::checksum_of(b"some compressed bytes"),
        };
        let bytes = meta.encode_into_vec();
        let mut cursor = std::io::Cursor::new(bytes);
        let decoded = BlockMetadata::decode_from(&mut cursor).unwrap();
        assert_eq!(meta, decoded);
    }

    #[test]
    fn checksum_catches_corrupted_payload() {
        let data: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
        let compressed = CompressionType::Zstd(3).compress(&data).unwrap();
        let meta = BlockMetadata {
            compressed_size: compressed.len() as u64,
            uncompressed_size: data.len() as u64,
            offset: 0,
            checksum: BlockMetadata::checksum_of(&compressed),
        };
        meta.verify(&compressed).unwrap();

        let mut corrupted = compressed.clone();
        corrupted[0] ^= 0xFF;
        let err = meta.verify(&corrupted).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn compression_type_encode_decode_round_trip() {
        for ct in [CompressionType::None, CompressionType::Zstd(1), CompressionType::Zstd(19)] {
            let bytes = ct.encode_into_vec();
            let mut cursor = std::io::Cursor::new(bytes);
            let decoded = CompressionType::decode_from(&mut cursor).unwrap();
            assert_eq!(ct, decoded);
        }
    }
}

//! Uniform compression service over the record payload codecs.
//!
//! One stateless entry point per direction: [`compress`] and [`decompress`],
//! plus [`max_compressed_len`] for conservative output sizing. LZ4 and LZ4-HC
//! go through the `lz4` block API; gzip goes through `flate2`. Type `None`
//! copies.

use std::io::{Cursor, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lz4::block::CompressionMode;

use crate::error::{EvioError, Result};

/// LZ4-HC level used for [`CompressionType::Lz4Hc`]. The high-compression
/// range is 2–12; 9 trades roughly 2x the cpu of fast mode for the bulk of
/// the attainable ratio gain.
const LZ4_HC_LEVEL: i32 = 9;

/// Gzip level used for [`CompressionType::Gzip`].
const GZIP_LEVEL: u32 = 6;

// ---------------------------------------------------------------------------
// Compression type
// ---------------------------------------------------------------------------

/// Record compression kind, stored in bits 28–31 of record-header word 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    #[default]
    None,
    Lz4,
    Lz4Hc,
    Gzip,
}

impl CompressionType {
    /// Wire code (0–3).
    #[inline]
    pub fn code(self) -> u32 {
        match self {
            CompressionType::None => 0,
            CompressionType::Lz4 => 1,
            CompressionType::Lz4Hc => 2,
            CompressionType::Gzip => 3,
        }
    }

    /// Decodes a wire code read from a record header.
    pub fn from_code(code: u32) -> Result<CompressionType> {
        match code {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            2 => Ok(CompressionType::Lz4Hc),
            3 => Ok(CompressionType::Gzip),
            other => Err(EvioError::Compression(format!(
                "unknown compression type code {other}"
            ))),
        }
    }

    #[inline]
    pub fn is_compressed(self) -> bool {
        self != CompressionType::None
    }
}

// ---------------------------------------------------------------------------
// Sizing
// ---------------------------------------------------------------------------

/// Conservative upper bound on compressed output size for `src_len` input
/// bytes. Always at least `src_len` plus codec framing overhead, so a
/// destination of this size never fails for capacity reasons.
pub fn max_compressed_len(kind: CompressionType, src_len: usize) -> usize {
    match kind {
        CompressionType::None => src_len,
        // LZ4 worst case: incompressible input expands by 1/255 + constant.
        CompressionType::Lz4 | CompressionType::Lz4Hc => src_len + src_len / 255 + 16,
        // Deflate stored-block worst case plus gzip header/trailer.
        CompressionType::Gzip => src_len + (src_len >> 12) + (src_len >> 14) + 64,
    }
}

// ---------------------------------------------------------------------------
// Compress / decompress
// ---------------------------------------------------------------------------

/// Compresses `src` into `dst`, returning the compressed byte count.
///
/// `dst` must be at least [`max_compressed_len`] bytes for the given kind.
/// The reported length is the raw codec output; word-alignment padding is the
/// record builder's concern.
pub fn compress(kind: CompressionType, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    match kind {
        CompressionType::None => {
            if dst.len() < src.len() {
                return Err(EvioError::Compression(format!(
                    "destination too small: {} < {}",
                    dst.len(),
                    src.len()
                )));
            }
            dst[..src.len()].copy_from_slice(src);
            Ok(src.len())
        }
        CompressionType::Lz4 => lz4_block_compress(src, dst, None),
        CompressionType::Lz4Hc => lz4_block_compress(
            src,
            dst,
            Some(CompressionMode::HIGHCOMPRESSION(LZ4_HC_LEVEL)),
        ),
        CompressionType::Gzip => {
            let mut encoder = GzEncoder::new(Cursor::new(dst), Compression::new(GZIP_LEVEL));
            encoder
                .write_all(src)
                .map_err(|e| EvioError::Compression(format!("gzip: {e}")))?;
            let cursor = encoder
                .finish()
                .map_err(|e| EvioError::Compression(format!("gzip: {e}")))?;
            Ok(cursor.position() as usize)
        }
    }
}

/// Decompresses `src` into `dst`, which must hold exactly
/// `expected_uncompressed_len` bytes. Returns the decompressed byte count.
pub fn decompress(
    kind: CompressionType,
    src: &[u8],
    expected_uncompressed_len: usize,
    dst: &mut [u8],
) -> Result<usize> {
    if dst.len() < expected_uncompressed_len {
        return Err(EvioError::Compression(format!(
            "destination too small: {} < {}",
            dst.len(),
            expected_uncompressed_len
        )));
    }
    match kind {
        CompressionType::None => {
            if src.len() < expected_uncompressed_len {
                return Err(EvioError::Compression(format!(
                    "source holds {} of {} expected bytes",
                    src.len(),
                    expected_uncompressed_len
                )));
            }
            dst[..expected_uncompressed_len].copy_from_slice(&src[..expected_uncompressed_len]);
            Ok(expected_uncompressed_len)
        }
        CompressionType::Lz4 | CompressionType::Lz4Hc => lz4::block::decompress_to_buffer(
            src,
            Some(expected_uncompressed_len as i32),
            &mut dst[..expected_uncompressed_len],
        )
        .map_err(|e| EvioError::Compression(format!("lz4: {e}"))),
        CompressionType::Gzip => {
            let mut decoder = GzDecoder::new(src);
            decoder
                .read_exact(&mut dst[..expected_uncompressed_len])
                .map_err(|e| EvioError::Compression(format!("gzip: {e}")))?;
            Ok(expected_uncompressed_len)
        }
    }
}

fn lz4_block_compress(src: &[u8], dst: &mut [u8], mode: Option<CompressionMode>) -> Result<usize> {
    lz4::block::compress_to_buffer(src, mode, false, dst)
        .map_err(|e| EvioError::Compression(format!("lz4: {e}")))
}

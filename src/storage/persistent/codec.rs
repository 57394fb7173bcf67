//! Framing for bucket files.
//!
//! Every bucket file holds exactly one frame:
//!
//! ```text
//! [version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
//! ```

use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult};

use crc32fast::Hasher;

/// Current frame version.
pub const CODEC_VERSION: u8 = 1;

/// Default payload limit (100 MB).
pub const DEFAULT_MAX_PAYLOAD: usize = 100 * 1024 * 1024;

fn oversized(len: usize, max: usize) -> IoError {
    IoError::new(
        ErrorKind::InvalidData,
        format!("entry size {len} exceeds maximum {max}"),
    )
}

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Wraps `data` in a checksummed frame, refusing payloads above `max`.
pub fn encode(data: &[u8], max: usize) -> IoResult<Vec<u8>> {
    if data.len() > max {
        return Err(oversized(data.len(), max));
    }
    let len = u32::try_from(data.len())
        .map_err(|_| IoError::new(ErrorKind::InvalidData, "entry length overflows u32"))?;

    let mut out = Vec::with_capacity(1 + 4 + data.len() + 4);
    out.push(CODEC_VERSION);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(&checksum(data).to_le_bytes());
    Ok(out)
}

/// Reads one frame and returns its verified payload.
///
/// # Errors
/// - unsupported version byte
/// - declared length above `max`
/// - truncated input
/// - checksum mismatch
pub fn decode(reader: &mut impl Read, max: usize) -> IoResult<Vec<u8>> {
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    if version[0] != CODEC_VERSION {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!(
                "unsupported codec version: {} (expected {CODEC_VERSION})",
                version[0]
            ),
        ));
    }

    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > max {
        return Err(oversized(len, max));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;

    let mut crc_bytes = [0u8; 4];
    reader.read_exact(&mut crc_bytes)?;
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = checksum(&data);
    if stored != computed {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("CRC mismatch: stored={stored:08x}, computed={computed:08x} (data corrupted)"),
        ));
    }
    Ok(data)
}

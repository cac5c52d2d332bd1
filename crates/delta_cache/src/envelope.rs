//! Validated binary envelope shared by every persisted file.
//!
//! Each file is written as a 4-byte little-endian header length, a bincode
//! header carrying magic bytes, a format version and an XXH3 checksum of the
//! payload, then the payload itself. A reader rejects the whole file on any
//! mismatch, so a file is either trusted completely or treated as absent.

use std::path::Path;

use delta_common::ContentHash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Identifies one kind of persisted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileKind {
    /// Magic bytes written at the start of the header.
    pub magic: [u8; 4],
    /// Current format version. Increment on breaking payload changes.
    pub version: u32,
}

/// ABI snapshot files.
pub const SNAPSHOT_FILE: FileKind = FileKind {
    magic: *b"DABI",
    version: 1,
};

/// Last-build info files.
pub const BUILD_INFO_FILE: FileKind = FileKind {
    magic: *b"DBIN",
    version: 1,
};

/// Build history files.
pub const BUILD_HISTORY_FILE: FileKind = FileKind {
    magic: *b"DHIS",
    version: 1,
};

/// Persistent cache map files.
pub const CACHE_MAP_FILE: FileKind = FileKind {
    magic: *b"DMAP",
    version: 1,
};

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeHeader {
    magic: [u8; 4],
    format_version: u32,
    checksum: ContentHash,
}

/// Encodes a value with the standard bincode configuration.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CacheError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(|e| {
        CacheError::Serialization {
            reason: e.to_string(),
        }
    })
}

/// Decodes a value written by [`encode`], rejecting trailing bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CacheError> {
    let (value, read) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
    if read != bytes.len() {
        return Err(CacheError::Serialization {
            reason: format!("{} trailing bytes", bytes.len() - read),
        });
    }
    Ok(value)
}

/// Wraps a payload in a validated envelope.
pub fn seal(kind: FileKind, payload: &[u8]) -> Result<Vec<u8>, CacheError> {
    let header = EnvelopeHeader {
        magic: kind.magic,
        format_version: kind.version,
        checksum: ContentHash::from_bytes(payload),
    };
    let header_bytes = encode(&header)?;
    let header_len = header_bytes.len() as u32;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(payload);
    Ok(output)
}

/// Validates an envelope read from `path` and returns its payload.
pub fn unseal<'a>(kind: FileKind, path: &Path, raw: &'a [u8]) -> Result<&'a [u8], CacheError> {
    let invalid = |reason: &str| CacheError::InvalidHeader {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    if raw.len() < 4 {
        return Err(invalid("truncated header length"));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&raw[..4]);
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    if raw.len() < 4 + header_len {
        return Err(invalid("truncated header"));
    }

    let header: EnvelopeHeader = bincode::serde::decode_from_slice(
        &raw[4..4 + header_len],
        bincode::config::standard(),
    )
    .map_err(|e| invalid(&e.to_string()))?
    .0;

    if header.magic != kind.magic {
        return Err(invalid("wrong magic bytes"));
    }
    if header.format_version != kind.version {
        return Err(CacheError::VersionMismatch {
            path: path.to_path_buf(),
            expected: kind.version,
            actual: header.format_version,
        });
    }

    let payload = &raw[4 + header_len..];
    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(CacheError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: header.checksum.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(payload)
}

/// Reads and validates a file, returning `None` if it does not exist.
pub fn read_file<T: DeserializeOwned>(kind: FileKind, path: &Path) -> Result<Option<T>, CacheError> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, e)),
    };
    let payload = unseal(kind, path, &raw)?;
    decode(payload).map(Some)
}

/// Encodes and seals a value, ready to be written.
pub fn to_file_bytes<T: Serialize>(kind: FileKind, value: &T) -> Result<Vec<u8>, CacheError> {
    seal(kind, &encode(value)?)
}

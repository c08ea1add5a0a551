//! Adler-32 integrity tag (RFC 1950).
//!
//! The on-disk tag is exactly four bytes: the big-endian encoding of the
//! Adler-32 checksum of the companion `.json` file's byte content.

use adler32::RollingAdler32;

use pkv_types::KvsError;

/// Size of the on-disk tag in bytes.
pub const TAG_LEN: usize = 4;

/// Compute the Adler-32 checksum of `data`.
pub fn checksum(data: &[u8]) -> u32 {
    RollingAdler32::from_buffer(data).hash()
}

/// The 4-byte big-endian on-disk encoding of the checksum of `data`.
pub fn tag_bytes(data: &[u8]) -> [u8; TAG_LEN] {
    checksum(data).to_be_bytes()
}

/// Decode a stored tag.
///
/// Fails with `KvsHashFileReadError` when the stored tag is not exactly
/// four bytes, which covers truncated or otherwise short hash files.
pub fn read_tag(tag: &[u8]) -> Result<u32, KvsError> {
    let bytes: [u8; TAG_LEN] = tag.try_into().map_err(|_| KvsError::KvsHashFileReadError)?;
    Ok(u32::from_be_bytes(bytes))
}

/// Returns `true` when `tag` is a well-formed tag matching `data`.
pub fn tag_matches(data: &[u8], tag: &[u8]) -> bool {
    read_tag(tag).is_ok_and(|stored| stored == checksum(data))
}

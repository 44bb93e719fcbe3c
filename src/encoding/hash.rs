//! Stream fingerprints using xxh3

/// 64-bit xxh3 fingerprint of an encoded stream.
#[inline]
pub fn fingerprint(data: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(data)
}

/// Format a fingerprint as a fixed-width hex string.
pub fn format_fingerprint(hash: u64) -> String {
    format!("{hash:016x}")
}

//! Shared helper functions for PostgreSQL row conversion.

use argus_core::error::{StorageError, StorageResult};

/// Convert a `Vec<u8>` to a fixed-size 32-byte array.
///
/// Returns an error if the length doesn't match.
pub fn bytes_to_hash32(bytes: Vec<u8>, field_name: &str) -> StorageResult<[u8; 32]> {
    bytes.try_into().map_err(|v: Vec<u8>| {
        StorageError::SerializationError(format!(
            "{} has invalid length: expected 32, got {}",
            field_name,
            v.len()
        ))
    })
}

/// Convert a `Vec<u8>` to a 32-byte array, rejecting all-zero values as corrupt.
///
/// This is stricter than `bytes_to_hash32` and should be used for block hashes
/// where all-zeros indicates data corruption. Previous-block hashes must use
/// the non-strict variant: the genesis block's is legitimately all zeros.
pub fn bytes_to_hash32_strict(bytes: Vec<u8>, field_name: &str) -> StorageResult<[u8; 32]> {
    let arr = bytes_to_hash32(bytes, field_name)?;

    if arr == [0u8; 32] {
        return Err(StorageError::SerializationError(format!(
            "{} is all zeros, which indicates data corruption",
            field_name
        )));
    }

    Ok(arr)
}

/// Convert a `Vec<u8>` to a fixed-size 20-byte array (contract script hash).
pub fn bytes_to_hash20(bytes: Vec<u8>, field_name: &str) -> StorageResult<[u8; 20]> {
    bytes.try_into().map_err(|v: Vec<u8>| {
        StorageError::SerializationError(format!(
            "{} has invalid length: expected 20, got {}",
            field_name,
            v.len()
        ))
    })
}

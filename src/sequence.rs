//! Auto-increment keys: unsigned 64-bit integers stored as 8 big-endian
//! bytes, so byte order equals numeric order.

use crate::constants::SEQUENCE_KEY_LEN;
use crate::error::{Error, Result};

pub fn encode(key: u64) -> [u8; SEQUENCE_KEY_LEN] {
    key.to_be_bytes()
}

pub fn decode(bytes: &[u8]) -> Result<u64> {
    let bytes: [u8; SEQUENCE_KEY_LEN] = bytes.try_into().map_err(|_| {
        Error::invariant(format!(
            "sequence keys are {} bytes, found a {}-byte key",
            SEQUENCE_KEY_LEN,
            bytes.len()
        ))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

/// Key following `last`, the greatest key currently stored (0 when empty).
///
/// The result always encodes strictly greater than `last`, which append
/// mode puts rely on.
pub fn next_key(last: Option<&[u8]>) -> Result<u64> {
    let last = match last {
        Some(last) => last,
        None => return Ok(0),
    };
    let next = decode(last)?
        .checked_add(1)
        .ok_or_else(|| Error::invariant("sequence key space exhausted"))?;
    if encode(next).as_slice() <= last {
        return Err(Error::invariant("derived sequence key does not sort after the last key"));
    }
    Ok(next)
}

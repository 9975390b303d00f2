//! Chain address helpers.
//!
//! An address is `0x` followed by exactly 40 hexadecimal digits (20 bytes).
//! Validation is syntactic only; mixed-case input is accepted without an
//! EIP-55 checksum check.

use crate::error::DaoError;

/// Length of an address in bytes.
pub const ADDRESS_BYTES: usize = 20;

/// The canonical zero address.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Returns `true` if `s` is a syntactically valid address.
pub fn is_valid_address(s: &str) -> bool {
    match s.strip_prefix("0x") {
        Some(hex) => hex.len() == ADDRESS_BYTES * 2 && hex.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

/// Validate `s`, returning it unchanged or an [`DaoError::InvalidAddress`].
pub fn ensure_valid_address(s: &str) -> Result<&str, DaoError> {
    if is_valid_address(s) {
        Ok(s)
    } else {
        Err(DaoError::InvalidAddress {
            address: s.to_string(),
        })
    }
}

/// Returns `true` iff `address` is the all-zero address.
pub fn is_empty_address(address: &str) -> bool {
    address == ZERO_ADDRESS
}

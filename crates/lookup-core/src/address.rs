//! Address format predicate
//!
//! Accounts are bech32 strings: `g` + `1` + 38 data characters. Only the shape
//! is checked here (prefix, length, charset); the checksum is not verified,
//! since a wrong-but-well-formed address simply resolves as not found.

/// Human-readable prefix of account addresses
pub const ADDRESS_HRP: &str = "g";

/// Total length of an account address, including `g1`
pub const ADDRESS_LEN: usize = 40;

const BECH32_CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Check whether `input` has the shape of an account address
pub fn is_valid_address(input: &str) -> bool {
    let Some(data) = input
        .strip_prefix(ADDRESS_HRP)
        .and_then(|rest| rest.strip_prefix('1'))
    else {
        return false;
    };

    input.len() == ADDRESS_LEN && data.bytes().all(|b| BECH32_CHARSET.contains(&b))
}

//! Address shape checks

/// Required prefix of a chain address
pub const ADDRESS_PREFIX: &str = "0x";

/// Total length including the prefix (20 bytes as hex)
pub const ADDRESS_LEN: usize = 42;

/// Lenient syntactic check: `0x` prefix and 42 characters total.
///
/// Hex-digit content is not checked.
pub fn is_valid(address: &str) -> bool {
    address.starts_with(ADDRESS_PREFIX) && address.chars().count() == ADDRESS_LEN
}

/// Canonical (lower-cased) form used for keying
pub fn canonical(address: &str) -> String {
    address.to_lowercase()
}

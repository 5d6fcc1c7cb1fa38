use alloy::primitives::U256;

/// Convert a string (hex or decimal) to U256.
pub fn to_u256(s: &str) -> Option<U256> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(hex) = s.strip_prefix("0x") {
        return U256::from_str_radix(hex, 16).ok();
    }

    if s.chars().all(|c| c.is_ascii_digit()) {
        return U256::from_str_radix(s, 10).ok();
    }

    None
}

/// Parse a program-counter token, accepting both `0x`-prefixed hex and
/// bare decimal (the block-partition format emits hex).
pub fn to_pc(s: &str) -> Option<usize> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x") {
        return usize::from_str_radix(hex, 16).ok();
    }
    s.parse().ok()
}

//! Deterministic string mixing hash.

/// FNV-1a 32-bit hash rendered in base-36.
///
/// Pure and deterministic: the same input always yields the same output.
/// Used only for cardinality reduction and to keep raw values (timestamps,
/// environment strings) out of identifiers; this is not a cryptographic
/// guarantee.
pub fn fnv1a_base36(input: &str) -> String {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let mut hash = OFFSET_BASIS;
    for byte in input.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    to_base36(hash)
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = [0u8; 7];
    let mut pos = buf.len();
    while value > 0 {
        pos -= 1;
        buf[pos] = DIGITS[(value % 36) as usize];
        value /= 36;
    }
    String::from_utf8_lossy(&buf[pos..]).into_owned()
}

//! The host's 64-bit identifier hash (Bob Jenkins' lookup8 with level 0) and
//! its fixed-width text form used to name assets inside scripts.

const GOLDEN_RATIO: u64 = 0x9e37_79b9_7f4a_7c13;

fn mix(a: &mut u64, b: &mut u64, c: &mut u64) {
    macro_rules! step {
        ($x:expr, $y:expr, $z:expr, $op:tt, $shift:expr) => {
            *$x = $x.wrapping_sub(*$y).wrapping_sub(*$z);
            *$x ^= *$z $op $shift;
        };
    }
    step!(a, b, c, >>, 43);
    step!(b, c, a, <<, 9);
    step!(c, a, b, >>, 8);
    step!(a, b, c, >>, 38);
    step!(b, c, a, <<, 23);
    step!(c, a, b, >>, 5);
    step!(a, b, c, >>, 35);
    step!(b, c, a, <<, 49);
    step!(c, a, b, >>, 11);
    step!(a, b, c, >>, 12);
    step!(b, c, a, <<, 18);
    step!(c, a, b, >>, 22);
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

pub fn idstring_hash(text: &str) -> u64 {
    let bytes = text.as_bytes();
    let mut a = 0u64;
    let mut b = 0u64;
    let mut c = GOLDEN_RATIO;

    let mut chunks = bytes.chunks_exact(24);
    for chunk in &mut chunks {
        a = a.wrapping_add(read_u64(&chunk[0..8]));
        b = b.wrapping_add(read_u64(&chunk[8..16]));
        c = c.wrapping_add(read_u64(&chunk[16..24]));
        mix(&mut a, &mut b, &mut c);
    }

    let tail = chunks.remainder();
    let mut padded = [0u8; 24];
    padded[..tail.len()].copy_from_slice(tail);

    c = c.wrapping_add(bytes.len() as u64);
    a = a.wrapping_add(read_u64(&padded[0..8]));
    b = b.wrapping_add(read_u64(&padded[8..16]));
    // The low byte of c is reserved for the length.
    c = c.wrapping_add(read_u64(&padded[16..23]) << 8);
    mix(&mut a, &mut b, &mut c);
    c
}

pub fn format_hash(hash: u64) -> String {
    format!("{:016x}", hash)
}

pub fn idstring_hex(text: &str) -> String {
    format_hash(idstring_hash(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_hash_is_zero_padded_lowercase() {
        assert_eq!(format_hash(0), "0000000000000000");
        assert_eq!(format_hash(0xABCDEF), "0000000000abcdef");
        assert_eq!(format_hash(u64::MAX), "ffffffffffffffff");
    }

    #[test]
    fn idstring_hash_is_deterministic() {
        assert_eq!(idstring_hash("weapons/ak47"), idstring_hash("weapons/ak47"));
        assert_eq!(idstring_hex("xml"), idstring_hex("xml"));
        assert_eq!(idstring_hex("xml").len(), 16);
    }

    #[test]
    fn idstring_hash_matches_known_values() {
        // "texture" is the engine's own extension hash for texture assets.
        assert_eq!(idstring_hex("texture"), "5368e150b05a5b8c");
        assert_eq!(idstring_hash("texture"), 0x5368_e150_b05a_5b8c);
        assert_eq!(idstring_hex(""), "8db63936938575bf");
        assert_eq!(idstring_hex("xml"), "64741f669743a27e");
        assert_eq!(idstring_hex("unit"), "7dbca958ad01668f");
        assert_eq!(
            idstring_hex("an identifier that spans more than one twenty-four byte block"),
            "6ff39c5416e096a6"
        );
    }

    #[test]
    fn idstring_hash_distinguishes_identifiers() {
        let names = [
            "",
            "a",
            "b",
            "xml",
            "unit",
            "weapons/ak47",
            "weapons/ak48",
            "settings/network",
            "an identifier that spans more than one twenty-four byte block",
            "an identifier that spans more than one twenty-four byte blocK",
        ];
        let mut seen = std::collections::BTreeSet::new();
        for name in names {
            assert!(seen.insert(idstring_hash(name)), "collision for {:?}", name);
        }
    }

    #[test]
    fn idstring_hex_only_uses_lowercase_hex_digits() {
        let hex = idstring_hex("units/payday2/characters/fps_mover/fps_mover");
        assert!(hex
            .chars()
            .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch)));
    }
}

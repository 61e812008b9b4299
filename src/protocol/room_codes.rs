use rand::RngExt;

use super::types::ROOM_CODE_LENGTH;

/// Generate a 5-character uppercase room code, avoiding the easily
/// confused glyphs (O, I, Q) so codes survive being read out loud.
pub fn generate_room_code() -> String {
    const CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPRSTUVWXYZ";
    let mut rng = rand::rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..CODE_CHARS.len());
            // SAFETY: `idx` is produced by `random_range(0..len)`, so it is
            // always within [0, len).
            #[allow(clippy::indexing_slicing)]
            let ch = CODE_CHARS[idx] as char;
            ch
        })
        .collect()
}

/// Normalize a client-supplied code for lookup.
pub fn normalize_room_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// A syntactically valid room code: exactly five uppercase ASCII letters.
pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LENGTH && code.chars().all(|c| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_shape() {
        for _ in 0..100 {
            let code = generate_room_code();
            assert_eq!(code.len(), ROOM_CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_uppercase()));
            assert!(!code.contains('O'));
            assert!(!code.contains('I'));
            assert!(!code.contains('Q'));
        }
    }

    #[test]
    fn test_room_code_uniqueness_probability() {
        let mut codes = std::collections::HashSet::new();
        for _ in 0..100 {
            codes.insert(generate_room_code());
        }
        assert!(codes.len() > 90);
    }

    #[test]
    fn test_normalize_and_validate() {
        assert_eq!(normalize_room_code(" abcde "), "ABCDE");
        assert!(is_valid_room_code("ABCDE"));
        assert!(!is_valid_room_code("ABCD"));
        assert!(!is_valid_room_code("abcde"));
        assert!(!is_valid_room_code("AB12E"));
    }
}

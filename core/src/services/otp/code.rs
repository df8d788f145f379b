//! Code generation, hashing and comparison

use constant_time_eq::constant_time_eq;
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};

/// Digits only
pub const NUMERIC_ALPHABET: &[u8] = b"0123456789";

/// Digits and upper-case letters without I and O
pub const ALPHANUMERIC_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Lower-case letters added in case-sensitive mode (no i, l or o)
pub const LOWERCASE_EXTENSION: &[u8] = b"abcdefghjkmnpqrstuvwxyz";

/// Generate a code of `length` characters from the OS random source
pub fn generate_code(length: usize, alphanumeric: bool, case_sensitive: bool) -> String {
    let alphabet: Vec<u8> = match (alphanumeric, case_sensitive) {
        (false, _) => NUMERIC_ALPHABET.to_vec(),
        (true, false) => ALPHANUMERIC_ALPHABET.to_vec(),
        (true, true) => [ALPHANUMERIC_ALPHABET, LOWERCASE_EXTENSION].concat(),
    };

    let mut rng = OsRng;
    (0..length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Hex SHA-256 of the code, upper-cased first unless case sensitive
pub fn hash_code(code: &str, case_sensitive: bool) -> String {
    let normalized = if case_sensitive {
        code.to_string()
    } else {
        code.to_uppercase()
    };
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Compare a submitted code against a stored hash in constant time
pub fn code_matches(stored_hash: &str, submitted: &str, case_sensitive: bool) -> bool {
    let submitted_hash = hash_code(submitted, case_sensitive);
    constant_time_eq(stored_hash.as_bytes(), submitted_hash.as_bytes())
}

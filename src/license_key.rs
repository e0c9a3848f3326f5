//! Random license key generation.
//!
//! Keys are fixed-length strings drawn from a 62-symbol alphanumeric
//! alphabet. Generation does not consult the store, so two calls may
//! produce the same key; the store's unique constraint is what rejects
//! duplicates.
//!
//! # Example
//!
//! ```
//! use securego::license_key::{generate_license_key, is_generated_key_format};
//!
//! let key = generate_license_key(10);
//! assert!(is_generated_key_format(&key, 10));
//! ```

use rand::Rng;

/// Alphabet random license keys are drawn from.
pub const LICENSE_KEY_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890";

/// Default length of a generated license key.
pub const DEFAULT_KEY_LENGTH: usize = 10;

/// Generate a random license key of `length` characters.
pub fn generate_license_key(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..LICENSE_KEY_ALPHABET.len());
            LICENSE_KEY_ALPHABET[idx] as char
        })
        .collect()
}

/// Check that `key` looks like something [`generate_license_key`] produced.
pub fn is_generated_key_format(key: &str, length: usize) -> bool {
    key.len() == length && key.bytes().all(|b| LICENSE_KEY_ALPHABET.contains(&b))
}

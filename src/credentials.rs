//! Pluggable credential storage.
//!
//! Account passwords pass through a [`CredentialHasher`] before they are
//! stored or matched. The default scheme keeps them as given; `sha256`
//! stores the hex digest instead. Matching on account creation compares
//! hashed values, so the scheme must not change once accounts exist.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::errors::{SecureGoError, SecureGoResult};

/// Transforms a password into the value persisted in the `users` table.
pub trait CredentialHasher: Send + Sync {
    /// Scheme name as it appears in configuration.
    fn name(&self) -> &'static str;

    /// Deterministic transform applied before storing or matching.
    fn hash(&self, password: &str) -> String;
}

/// Stores passwords as given.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextCredentials;

impl CredentialHasher for PlaintextCredentials {
    fn name(&self) -> &'static str {
        "plaintext"
    }

    fn hash(&self, password: &str) -> String {
        password.to_string()
    }
}

/// Stores the hex-encoded SHA-256 of the password.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Credentials;

impl CredentialHasher for Sha256Credentials {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn hash(&self, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Build the hasher named by `credentials.scheme`.
pub fn hasher_for_scheme(scheme: &str) -> SecureGoResult<Arc<dyn CredentialHasher>> {
    match scheme {
        "plaintext" => Ok(Arc::new(PlaintextCredentials)),
        "sha256" => Ok(Arc::new(Sha256Credentials)),
        other => Err(SecureGoError::ConfigError(format!(
            "unsupported credential scheme: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_is_identity() {
        assert_eq!(PlaintextCredentials.hash("pw1"), "pw1");
    }

    #[test]
    fn sha256_is_hex_digest() {
        let hashed = Sha256Credentials.hash("pw1");
        assert_eq!(hashed.len(), 64);
        assert_eq!(hashed, Sha256Credentials.hash("pw1"));
        assert_ne!(hashed, Sha256Credentials.hash("pw2"));
        assert_eq!(
            Sha256Credentials.hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn scheme_lookup() {
        assert_eq!(hasher_for_scheme("plaintext").unwrap().name(), "plaintext");
        assert_eq!(hasher_for_scheme("sha256").unwrap().name(), "sha256");
        assert!(hasher_for_scheme("md5").is_err());
    }
}

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Turns raw passwords into stored hashes and checks candidates against them.
pub trait PasswordEncoder: Send + Sync {
    fn encode(&self, raw: &str) -> String;

    fn matches(&self, raw: &str, encoded: &str) -> bool;
}

/// Salted SHA-256, stored as `<salt>$<hex digest>`.
///
/// Stand-in until a proper key-derivation function is wired in; a single
/// SHA-256 round is far too fast to resist offline guessing.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256PasswordEncoder;

impl Sha256PasswordEncoder {
    fn digest(salt: &str, raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(raw.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl PasswordEncoder for Sha256PasswordEncoder {
    fn encode(&self, raw: &str) -> String {
        let salt = Uuid::new_v4().simple().to_string();
        format!("{}${}", salt, Self::digest(&salt, raw))
    }

    fn matches(&self, raw: &str, encoded: &str) -> bool {
        match encoded.split_once('$') {
            Some((salt, digest)) => Self::digest(salt, raw) == digest,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_password_gets_different_hashes() {
        let encoder = Sha256PasswordEncoder;
        let a = encoder.encode("Secret!23");
        let b = encoder.encode("Secret!23");

        assert_ne!(a, b);
        assert!(encoder.matches("Secret!23", &a));
        assert!(encoder.matches("Secret!23", &b));
    }

    #[test]
    fn test_malformed_hash_never_matches() {
        let encoder = Sha256PasswordEncoder;
        assert!(!encoder.matches("Secret!23", "no-separator"));
        assert!(!encoder.matches("Secret!23", ""));
    }
}

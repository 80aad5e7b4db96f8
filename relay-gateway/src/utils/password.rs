use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use secrecy::{ExposeSecret, SecretString};

/// PHC-format Argon2id hash of a login secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretHash(String);

impl SecretHash {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a secret with Argon2id and a fresh random salt.
pub fn hash_secret(secret: &SecretString) -> Result<SecretHash, anyhow::Error> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(secret.expose_secret().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash secret: {}", e))?
        .to_string();

    Ok(SecretHash::new(hash))
}

/// Check `secret` against a stored hash.
///
/// A malformed stored hash is treated as a mismatch.
pub fn verify_secret(secret: &SecretString, hash: &SecretHash) -> bool {
    let parsed = match PasswordHash::new(hash.as_str()) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "Stored credential hash is malformed");
            return false;
        }
    };

    Argon2::default()
        .verify_password(secret.expose_secret().as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::new(s.to_string())
    }

    #[test]
    fn hash_is_argon2id_phc() {
        let hash = hash_secret(&secret("hunter22")).expect("hash");
        assert!(hash.as_str().starts_with("$argon2id$"));
    }

    #[test]
    fn verifies_matching_secret_only() {
        let hash = hash_secret(&secret("hunter22")).expect("hash");
        assert!(verify_secret(&secret("hunter22"), &hash));
        assert!(!verify_secret(&secret("hunter23"), &hash));
    }

    #[test]
    fn same_secret_hashes_differently() {
        let a = hash_secret(&secret("same")).expect("hash");
        let b = hash_secret(&secret("same")).expect("hash");
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_never_verifies() {
        let bogus = SecretHash::new("not-a-phc-string".to_string());
        assert!(!verify_secret(&secret("anything"), &bogus));
    }
}

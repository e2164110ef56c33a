use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use tracing::error;

/// Turns plaintext passwords into stored digests and checks them back.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plain: &str) -> anyhow::Result<String>;
    fn verify(&self, plain: &str, digest: &str) -> anyhow::Result<bool>;
}

#[derive(Clone, Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    /// Argon2id with a custom memory cost (KiB) and iteration count.
    pub fn with_cost(m_cost: u32, t_cost: u32) -> anyhow::Result<Self> {
        let params = Params::new(m_cost, t_cost, 1, None).map_err(|e| {
            error!(error = %e, "argon2 params error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    // Cost parameters come from the PHC string, so digests made with any
    // cost verify here.
    fn verify(&self, plain: &str, digest: &str) -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(digest).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            anyhow::anyhow!(e.to_string())
        })?;
        Ok(self
            .argon2
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }
}

#[cfg(test)]
mod password_tests {
    use super::*;

    fn hasher() -> Argon2Hasher {
        Argon2Hasher::with_cost(1024, 1).expect("params")
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hasher().hash(password).expect("hashing should succeed");
        assert!(hasher().verify(password, &hash).expect("verify should succeed"));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hasher().hash(password).expect("hashing should succeed");
        assert!(!hasher().verify("wrong-password", &hash).expect("verify should not error"));
    }

    #[test]
    fn verify_errors_on_malformed_hash() {
        let err = hasher().verify("anything", "not-a-valid-hash").unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn default_cost_digest_verifies_with_cheap_hasher() {
        let digest = Argon2Hasher::default().hash("long-password").unwrap();
        assert!(hasher().verify("long-password", &digest).unwrap());
    }
}

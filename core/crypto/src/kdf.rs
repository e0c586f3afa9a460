//! Password digests using Argon2id.
//!
//! Argon2id is a memory-hard password hashing function that provides
//! resistance to both GPU and time-memory trade-off attacks. Digests are
//! encoded as PHC strings, so the salt and cost parameters travel with the
//! digest and verification needs nothing else.

use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

use nivelver_common::{Error, Password, Result};

/// Salt length in bytes.
const SALT_LENGTH: usize = 16;

/// Parameters for Argon2id hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (e.g., 65536 = 64 MiB).
    pub memory_cost: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl KdfParams {
    /// Create parameters suitable for interactive use.
    pub fn interactive() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
        }
    }

    /// Create parameters suitable for sensitive data.
    ///
    /// Higher security parameters that may take several seconds.
    pub fn sensitive() -> Self {
        Self {
            memory_cost: 262144, // 256 MiB
            time_cost: 4,
            parallelism: 4,
        }
    }

    /// Create moderate parameters for mobile devices.
    pub fn moderate() -> Self {
        Self {
            memory_cost: 32768, // 32 MiB
            time_cost: 3,
            parallelism: 2,
        }
    }

    /// Resolve a preset by name: "interactive", "moderate" or "sensitive".
    pub fn preset(name: &str) -> Result<Self> {
        match name {
            "interactive" => Ok(Self::interactive()),
            "moderate" => Ok(Self::moderate()),
            "sensitive" => Ok(Self::sensitive()),
            other => Err(Error::InvalidInput(format!(
                "Unknown KDF preset '{}'. Use: interactive, moderate, or sensitive",
                other
            ))),
        }
    }

    fn to_argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(self.memory_cost, self.time_cost, self.parallelism, None)
            .map_err(|e| Error::Crypto(format!("Invalid KDF parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::moderate()
    }
}

/// Hash a password into an Argon2id PHC string.
///
/// # Postconditions
/// - Returns a digest embedding a fresh random salt and `params`
/// - Two calls with the same password produce different digests
///
/// # Errors
/// - Returns error if Argon2id parameters are invalid
pub fn hash_password(password: &Password, params: &KdfParams) -> Result<String> {
    use rand::RngCore;
    let mut salt_bytes = [0u8; SALT_LENGTH];
    rand::rng().fill_bytes(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| Error::Crypto(format!("Salt encoding failed: {}", e)))?;

    let digest = params
        .to_argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::Crypto(format!("Password hashing failed: {}", e)))?;

    Ok(digest.to_string())
}

/// Verify a password against a PHC digest.
///
/// A digest that does not parse as a PHC string never matches; this keeps
/// records carrying a legacy or corrupted credential from being usable
/// without turning login into a hard error.
pub fn verify_password(password: &Password, digest: &str) -> Result<bool> {
    let Ok(parsed) = PasswordHash::new(digest) else {
        return Ok(false);
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(Error::Crypto(format!("Password verification failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> KdfParams {
        KdfParams {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let password = Password::new("secure-password").unwrap();
        let digest = hash_password(&password, &fast_params()).unwrap();

        assert!(digest.starts_with("$argon2id$"));
        assert!(verify_password(&password, &digest).unwrap());

        let wrong = Password::new("wrong-password").unwrap();
        assert!(!verify_password(&wrong, &digest).unwrap());
    }

    #[test]
    fn test_hash_is_salted() {
        let password = Password::new("test-password-123").unwrap();
        let d1 = hash_password(&password, &fast_params()).unwrap();
        let d2 = hash_password(&password, &fast_params()).unwrap();

        assert_ne!(d1, d2);
    }

    #[test]
    fn test_digest_never_contains_plaintext() {
        let password = Password::new("plaintext-marker").unwrap();
        let digest = hash_password(&password, &fast_params()).unwrap();
        assert!(!digest.contains("plaintext-marker"));
    }

    #[test]
    fn test_unparsable_digest_does_not_match() {
        let password = Password::new("pw").unwrap();
        assert!(!verify_password(&password, "pw").unwrap());
        assert!(!verify_password(&password, "").unwrap());
    }

    #[test]
    fn test_invalid_params_fail() {
        let password = Password::new("pw").unwrap();
        let params = KdfParams {
            memory_cost: 1,
            time_cost: 0,
            parallelism: 0,
        };
        assert!(matches!(
            hash_password(&password, &params),
            Err(Error::Crypto(_))
        ));
    }

    #[test]
    fn test_preset_lookup() {
        assert_eq!(KdfParams::preset("moderate").unwrap(), KdfParams::moderate());
        assert!(KdfParams::preset("extreme").is_err());
    }
}

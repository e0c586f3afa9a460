//! Credential hasher abstraction.

use std::fmt;

use nivelver_common::{Password, Result};

use crate::kdf::{hash_password, verify_password, KdfParams};

/// Hashes and verifies account credentials.
///
/// The local store only ever persists what `hash` returns, and verifies
/// logins through `verify`. Both calls may be CPU-heavy; callers run them
/// off the async executor.
pub trait CredentialHasher: Send + Sync {
    /// Produce a digest for a plaintext password.
    fn hash(&self, password: &Password) -> Result<String>;

    /// Check a plaintext password against a stored digest.
    fn verify(&self, password: &Password, digest: &str) -> Result<bool>;
}

/// Argon2id implementation of [`CredentialHasher`].
#[derive(Clone, Default)]
pub struct Argon2Hasher {
    params: KdfParams,
}

impl Argon2Hasher {
    /// Create a hasher that produces digests with the given cost parameters.
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    /// Cost parameters used for new digests.
    pub fn params(&self) -> &KdfParams {
        &self.params
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &Password) -> Result<String> {
        hash_password(password, &self.params)
    }

    fn verify(&self, password: &Password, digest: &str) -> Result<bool> {
        verify_password(password, digest)
    }
}

impl fmt::Debug for Argon2Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Argon2Hasher")
            .field("params", &self.params)
            .finish()
    }
}

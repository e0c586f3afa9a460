//! Credential hashing for nivelver.
//!
//! This module provides:
//! - Password digests using Argon2id in PHC string format
//! - A hasher trait so the local store can be handed any implementation
//!
//! # Security Guarantees
//! - Plaintext passwords are never stored or logged
//! - Verification runs in constant time inside the argon2 crate

pub mod hasher;
pub mod kdf;

pub use hasher::{Argon2Hasher, CredentialHasher};
pub use kdf::{hash_password, verify_password, KdfParams};

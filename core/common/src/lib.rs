//! Common utilities and types shared across the nivelver crates.
//!
//! This module provides the error taxonomy, validated identifier types and
//! the record models that both stores agree on.

pub mod error;
pub mod models;
pub mod types;

pub use error::{Error, Result};
pub use models::{Audio, Lectura, User, Word};
pub use types::{now_millis, Nivel, Password, Username, DEFAULT_NIVEL};

//! Common types used throughout nivelver.

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Proficiency tier assigned to every new account.
pub const DEFAULT_NIVEL: &str = "A0";

/// Current wall-clock time as epoch milliseconds.
///
/// Every local or cloud-origin mutation of a user record is stamped with
/// this value.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Account name, the primary key of a user in both stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Create a Username from user input.
    ///
    /// Surrounding whitespace is trimmed.
    ///
    /// # Errors
    /// - Returns `Validation` if the name is blank
    /// - Returns `Validation` if the name contains '/' or is a dot segment,
    ///   since it doubles as a remote document id
    pub fn new(name: impl AsRef<str>) -> crate::Result<Self> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(crate::Error::Validation(
                "Username cannot be blank".to_string(),
            ));
        }
        if name.contains('/') || name == "." || name == ".." {
            return Err(crate::Error::Validation(format!(
                "Username '{}' is not a valid document id",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proficiency tier label such as "A0" or "B1".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nivel(String);

impl Nivel {
    /// Create a Nivel from user input.
    ///
    /// # Errors
    /// - Returns `Validation` if the label is blank
    pub fn new(label: impl AsRef<str>) -> crate::Result<Self> {
        let label = label.as_ref().trim();
        if label.is_empty() {
            return Err(crate::Error::Validation("Nivel cannot be blank".to_string()));
        }
        Ok(Self(label.to_string()))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Nivel {
    fn default() -> Self {
        Self(DEFAULT_NIVEL.to_string())
    }
}

impl fmt::Display for Nivel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plaintext password that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Password(String);

impl Password {
    /// Wrap a plaintext password.
    ///
    /// # Errors
    /// - Returns `Validation` if the password is blank
    pub fn new(plaintext: impl Into<String>) -> crate::Result<Self> {
        let plaintext = plaintext.into();
        if plaintext.trim().is_empty() {
            return Err(crate::Error::Validation(
                "Password cannot be blank".to_string(),
            ));
        }
        Ok(Self(plaintext))
    }

    /// Get the plaintext bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_username_trims() {
        let name = Username::new("  ana ").unwrap();
        assert_eq!(name.as_str(), "ana");
    }

    #[test]
    fn test_username_blank_fails() {
        assert!(matches!(
            Username::new("   "),
            Err(crate::Error::Validation(_))
        ));
    }

    #[test]
    fn test_username_rejects_separators() {
        assert!(Username::new("a/b").is_err());
        assert!(Username::new("..").is_err());
    }

    #[test]
    fn test_nivel_default() {
        assert_eq!(Nivel::default().as_str(), "A0");
    }

    #[test]
    fn test_password_blank_fails() {
        assert!(Password::new("").is_err());
        assert!(Password::new(" \t").is_err());
    }

    #[test]
    fn test_password_debug_redacts() {
        let password = Password::new("hunter2").unwrap();
        let debug = format!("{:?}", password);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    proptest! {
        #[test]
        fn prop_username_is_trimmed_input(name in "[a-zA-Z0-9_]{1,24}", pad in " {0,3}") {
            let parsed = Username::new(format!("{pad}{name}{pad}")).unwrap();
            prop_assert_eq!(parsed.as_str(), name.as_str());
        }
    }
}

//! Secret wrapper for sensitive values
//!
//! Refresh tokens flow through account records, log statements, and error
//! messages. Wrapping them in `Secret` keeps them out of Debug/Display
//! output and wipes the memory on drop. Account records arrive as JSON
//! with the secret embedded, so `Secret` also deserializes transparently
//! from the wrapped type.

use std::fmt;

use serde::{Deserialize, Deserializer};
use zeroize::Zeroize;

/// Sensitive value - redacted in Debug/Display/logs, zeroized on drop
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Create a new secret value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<'de, T: Zeroize + Deserialize<'de>> Deserialize<'de> for Secret<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Secret::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_redacts_debug() {
        let secret = Secret::new(String::from("rt_refresh_token"));
        let debug = format!("{:?}", secret);
        assert_eq!(debug, "[REDACTED]");
        assert!(!debug.contains("rt_refresh_token"));
    }

    #[test]
    fn test_secret_redacts_display() {
        let secret = Secret::new(String::from("rt_refresh_token"));
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_secret_exposes_value() {
        let secret = Secret::new(String::from("rt_refresh_token"));
        assert_eq!(secret.expose(), "rt_refresh_token");
    }

    #[test]
    fn test_secret_deserializes_from_plain_string() {
        let secret: Secret<String> = serde_json::from_str(r#""rt_from_json""#).unwrap();
        assert_eq!(secret.expose(), "rt_from_json");
    }
}

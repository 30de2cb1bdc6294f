//! Account records and startup loading
//!
//! Accounts are read once at process start and never mutated afterwards.
//! Two sources exist: a local JSON file (an array of account records) and
//! a base64-encoded blob in an environment variable carrying the same
//! JSON. The file always wins when it is present and parses.
//!
//! Loading fails softly: a malformed source is logged and skipped, and a
//! fully empty result leaves the service running in a `no_accounts`
//! state rather than aborting startup.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// A single Warp account credential.
///
/// Wire shape is `{"email": ..., "refreshToken": ...}`; the camelCase
/// field name matches the exported account files. The refresh token is
/// wrapped so it never appears in Debug output or logs.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub email: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: Secret<String>,
}

impl Account {
    pub fn new(email: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            refresh_token: Secret::new(refresh_token.into()),
        }
    }
}

/// Load accounts from the local file, falling back to the env blob.
///
/// Precedence: a present-and-parsable file wins over the env blob, even
/// when both are set. A present-but-malformed file logs an error and
/// falls through to the blob. When neither source yields accounts the
/// result is empty and callers report `no_accounts` status instead of
/// failing.
pub fn load_accounts(file: &Path, env_blob: Option<&str>) -> Vec<Account> {
    if file.exists() {
        match std::fs::read_to_string(file) {
            Ok(contents) => match serde_json::from_str::<Vec<Account>>(&contents) {
                Ok(accounts) => {
                    info!(path = %file.display(), accounts = accounts.len(), "loaded accounts from file");
                    return accounts;
                }
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "account file is malformed, trying env blob");
                }
            },
            Err(e) => {
                warn!(path = %file.display(), error = %e, "failed to read account file, trying env blob");
            }
        }
    }

    if let Some(blob) = env_blob {
        match decode_account_blob(blob) {
            Ok(accounts) => {
                info!(accounts = accounts.len(), "loaded accounts from env blob");
                return accounts;
            }
            Err(e) => {
                warn!(error = %e, "failed to decode account blob from environment");
            }
        }
    }

    warn!("no accounts loaded");
    Vec::new()
}

/// Decode a base64-encoded JSON array of account records.
fn decode_account_blob(blob: &str) -> Result<Vec<Account>> {
    let bytes = STANDARD
        .decode(blob.trim())
        .map_err(|e| Error::AccountParse(format!("invalid base64: {e}")))?;
    let json = String::from_utf8(bytes)
        .map_err(|e| Error::AccountParse(format!("blob is not UTF-8: {e}")))?;
    serde_json::from_str(&json).map_err(|e| Error::AccountParse(format!("invalid account JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts_json() -> &'static str {
        r#"[
            {"email": "a@example.com", "refreshToken": "rt_a"},
            {"email": "b@example.com", "refreshToken": "rt_b"}
        ]"#
    }

    fn encode(json: &str) -> String {
        STANDARD.encode(json.as_bytes())
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        std::fs::write(&path, accounts_json()).unwrap();

        let accounts = load_accounts(&path, None);
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].email, "a@example.com");
        assert_eq!(accounts[0].refresh_token.expose(), "rt_a");
    }

    #[test]
    fn file_wins_over_env_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        std::fs::write(&path, accounts_json()).unwrap();

        let blob = encode(r#"[{"email": "env@example.com", "refreshToken": "rt_env"}]"#);
        let accounts = load_accounts(&path, Some(&blob));
        assert_eq!(accounts.len(), 2);
        assert_eq!(
            accounts[0].email, "a@example.com",
            "file accounts must win even when the env blob is set"
        );
    }

    #[test]
    fn loads_from_env_blob_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");

        let blob = encode(accounts_json());
        let accounts = load_accounts(&path, Some(&blob));
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[1].email, "b@example.com");
    }

    #[test]
    fn malformed_file_falls_back_to_env_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        std::fs::write(&path, "not json at all").unwrap();

        let blob = encode(r#"[{"email": "env@example.com", "refreshToken": "rt_env"}]"#);
        let accounts = load_accounts(&path, Some(&blob));
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].email, "env@example.com");
    }

    #[test]
    fn malformed_env_blob_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");

        let accounts = load_accounts(&path, Some("%%% not base64 %%%"));
        assert!(accounts.is_empty());
    }

    #[test]
    fn valid_base64_invalid_json_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");

        let blob = encode("{\"not\": \"an array\"}");
        let accounts = load_accounts(&path, Some(&blob));
        assert!(accounts.is_empty());
    }

    #[test]
    fn no_sources_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");

        let accounts = load_accounts(&path, None);
        assert!(accounts.is_empty());
    }

    #[test]
    fn blob_with_surrounding_whitespace_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");

        let blob = format!("  {}\n", encode(accounts_json()));
        let accounts = load_accounts(&path, Some(&blob));
        assert_eq!(accounts.len(), 2);
    }

    #[test]
    fn debug_output_redacts_refresh_token() {
        let account = Account::new("a@example.com", "rt_secret_value");
        let debug = format!("{account:?}");
        assert!(debug.contains("a@example.com"));
        assert!(
            !debug.contains("rt_secret_value"),
            "refresh token must never appear in Debug output: {debug}"
        );
    }
}

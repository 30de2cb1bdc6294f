//! Access-token refresh
//!
//! The single token-endpoint interaction this proxy needs: exchanging an
//! account's long-lived refresh token for a short-lived access token via
//! the OAuth2 refresh-token grant (form-encoded POST). There is no retry
//! and no backoff: a failed refresh surfaces to the caller, who decides
//! what "no token" means for the request at hand.

use serde::Deserialize;

use crate::constants::{CLIENT_VERSION, CLIENT_VERSION_HEADER, DEFAULT_EXPIRES_IN_SECS};
use crate::error::{Error, Result};

/// Response from the token endpoint.
///
/// `expires_in` is a delta in seconds from the response time; the caller
/// converts it to an absolute unix timestamp when caching. The endpoint
/// occasionally omits it, in which case the standard one-hour lifetime
/// applies.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN_SECS
}

/// Refresh an access token using a refresh token.
///
/// POSTs `grant_type=refresh_token` to `token_url` with the Warp client
/// version header. `token_url` is a parameter rather than a constant so
/// the pool can be pointed at a mock endpoint in tests.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    token_url: &str,
    refresh_token: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(token_url)
        .header(CLIENT_VERSION_HEADER, CLIENT_VERSION)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        // 401/403 means the refresh token is revoked or invalid
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::RefreshFailed(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::RefreshFailed(format!("invalid token response: {e}")))
}

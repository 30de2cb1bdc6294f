//! Warp account authentication library
//!
//! Provides account loading and access-token refresh for the Warp pool
//! proxy. This crate is a standalone library with no dependency on the
//! proxy binary and can be tested and used independently.
//!
//! Credential flow:
//! 1. Accounts are loaded once at startup via `accounts::load_accounts()`
//!    (local JSON file first, base64 env blob as fallback)
//! 2. The pool exchanges an account's refresh token for a short-lived
//!    access token via `token::refresh_access_token()`
//! 3. Tokens are cached by the pool; this crate holds no state

pub mod accounts;
pub mod constants;
pub mod error;
pub mod token;

pub use accounts::{Account, load_accounts};
pub use constants::*;
pub use error::{Error, Result};
pub use token::{TokenResponse, refresh_access_token};

//! Account pool for the Warp proxy
//!
//! Hands out accounts round-robin and manages the per-account access
//! token cache. The pool is an explicitly owned value constructed at
//! startup and shared via `Arc`, never an ambient global, so tests build
//! isolated instances.
//!
//! Request flow:
//! 1. Handler calls `Pool::next_account()`: round-robin over the
//!    immutable account list, `None` when the pool is empty
//! 2. Handler calls `Pool::access_token()`: cached token if it is more
//!    than the safety margin away from expiry, otherwise one refresh
//!    call against the token endpoint
//! 3. A failed refresh surfaces as an error; there is no retry and the
//!    account keeps its place in the rotation

pub mod error;
pub mod pool;

pub use error::{Error, Result};
pub use pool::{Pool, SAFETY_MARGIN_SECS};

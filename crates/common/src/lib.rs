//! Common types for the Warp pool proxy

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;

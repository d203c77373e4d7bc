//! Authentication Module
//!
//! Bearer tokens for kiosk agents. Tokens are HS256 JWTs whose subject is the
//! actor identifier. `sync-server issue-token <actor>` prints one.

/// JWT token generation and validation
pub mod sessions;

pub use sessions::{create_token, verify_token, Claims};

/**
 * Session Tokens
 *
 * JWT generation and validation for kiosk agents. The token subject is the
 * actor identifier recorded as `created_by` on synced writes.
 */

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Actor identifier
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at time (Unix timestamp)
    pub iat: u64,
}

/// Create a JWT token for an actor
///
/// # Arguments
/// * `secret` - HMAC secret shared with the server
/// * `actor_id` - Subject of the token
/// * `ttl` - How long the token stays valid
pub fn create_token(
    secret: &str,
    actor_id: &str,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp().max(0) as u64;
    let claims = Claims {
        sub: actor_id.to_string(),
        exp: now + ttl.as_secs(),
        iat: now,
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key)
}

/// Verify and decode a JWT token
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let token_data = decode::<Claims>(token, &key, &Validation::default())?;
    Ok(token_data.claims)
}

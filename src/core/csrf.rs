//! Per-session token carried by every form as a hidden `csrf_token` field.

use actix_session::Session;
use uuid::Uuid;

use crate::core::errors::AppResult;

const CSRF_KEY: &str = "_csrf_token";

pub const INVALID_TOKEN_MESSAGE: &str = "The CSRF token is missing or invalid.";

/// Returns the session's token, minting one on first use.
pub fn token(session: &Session) -> AppResult<String> {
    if let Some(existing) = session.get::<String>(CSRF_KEY)? {
        return Ok(existing);
    }
    let fresh = Uuid::new_v4().simple().to_string();
    session.insert(CSRF_KEY, &fresh)?;
    Ok(fresh)
}

pub fn verify(session: &Session, submitted: &str) -> AppResult<bool> {
    let expected = session.get::<String>(CSRF_KEY)?;
    Ok(matches!(expected, Some(ref t) if !submitted.is_empty() && t == submitted))
}

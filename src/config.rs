use actix_web::cookie::Key;
use anyhow::Context;
use sha2::{Digest, Sha512};

/// The single account allowed to create, edit and delete posts.
pub const ADMIN_USER_ID: i32 = 1;

pub const MAX_FIELD_LENGTH: u64 = 250;

pub const GRAVATAR_SIZE: u32 = 100;
pub const GRAVATAR_RATING: &str = "g";
pub const GRAVATAR_DEFAULT: &str = "retro";

pub const DATE_FORMAT: &str = "%B %d, %Y";

const DEFAULT_DB_URI: &str = "sqlite://scribe.db?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5000";

#[derive(Clone, Debug)]
pub struct Config {
    pub secret_key: String,
    pub database_url: String,
    pub bind_addr: String,
    pub cookie_secure: bool,
}

impl Config {
    /// Reads `SCRIBE_*` variables, after loading `.env` when one exists.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let secret_key = std::env::var("SCRIBE_SECRET_KEY")
            .context("SCRIBE_SECRET_KEY must be set")?;
        if secret_key.is_empty() {
            anyhow::bail!("SCRIBE_SECRET_KEY must not be empty");
        }

        Ok(Config {
            secret_key,
            database_url: std::env::var("SCRIBE_DB_URI")
                .unwrap_or_else(|_| DEFAULT_DB_URI.to_string()),
            bind_addr: std::env::var("SCRIBE_BIND_ADDR")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            cookie_secure: std::env::var("SCRIBE_COOKIE_SECURE")
                .ok()
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        })
    }

    /// Cookie key for the session store. The secret may be any length; it is
    /// stretched to the 64 bytes the cookie jar needs.
    pub fn session_key(&self) -> Key {
        let digest = Sha512::digest(self.secret_key.as_bytes());
        Key::from(digest.as_slice())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

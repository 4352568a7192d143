use actix_web::{http::header, HttpResponse};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::config::{DATE_FORMAT, GRAVATAR_DEFAULT, GRAVATAR_RATING, GRAVATAR_SIZE};

pub fn today() -> String {
    chrono::Local::now().format(DATE_FORMAT).to_string()
}

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Avatar for a comment author. Gravatar accepts SHA-256 of the normalized
/// address.
pub fn gravatar_url(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    format!(
        "https://www.gravatar.com/avatar/{:x}?s={}&r={}&d={}",
        hasher.finalize(),
        GRAVATAR_SIZE,
        GRAVATAR_RATING,
        GRAVATAR_DEFAULT
    )
}

/// Rich text from the editor keeps its formatting tags; scripts, event
/// handlers and the like are removed.
pub fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert_ne!(hash, "hunter2");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = hash_password("secret").unwrap();
        let b = hash_password("secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("", ""));
    }

    #[test]
    fn gravatar_normalizes_email() {
        let a = gravatar_url("  Someone@Example.com ");
        let b = gravatar_url("someone@example.com");
        assert_eq!(a, b);
        assert!(a.starts_with("https://www.gravatar.com/avatar/"));
        assert!(a.ends_with("?s=100&r=g&d=retro"));
    }

    #[test]
    fn sanitize_strips_scripts_keeps_formatting() {
        let cleaned = sanitize_html("<p>Hi <strong>there</strong><script>alert(1)</script></p>");
        assert_eq!(cleaned, "<p>Hi <strong>there</strong></p>");

        let cleaned = sanitize_html(r#"<a href="https://x.test" onclick="steal()">x</a>"#);
        assert!(!cleaned.contains("onclick"));
    }

    #[test]
    fn today_is_long_form() {
        let date = today();
        assert!(chrono::NaiveDate::parse_from_str(&date, DATE_FORMAT).is_ok());
    }

    #[test]
    fn redirect_sets_location() {
        let resp = redirect("/login");
        assert_eq!(resp.status(), actix_web::http::StatusCode::FOUND);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/login");
    }
}

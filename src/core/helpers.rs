use std::collections::HashSet;
use std::sync::OnceLock;

use ammonia::Builder;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use html_escape::decode_html_entities;
use rand::rngs::OsRng;
use regex::Regex;
use uuid::Uuid;

use crate::core::errors::ApiError;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
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

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// Rejects path ids that could never name a stored document.
pub fn require_uuid(id: &str, what: &str) -> Result<(), ApiError> {
    if validate_uuid(id) {
        Ok(())
    } else {
        Err(ApiError::bad_request(format!("Invalid {} id.", what)))
    }
}

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Regex should compile"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Strips all markup so stored text is plain text. The cleaner entity-encodes what it
/// keeps, so the result is decoded again; JSON clients get the characters they sent.
pub fn sanitize_text(text: &str) -> String {
    let stripped = Builder::default().tags(HashSet::new()).clean(text).to_string();
    decode_html_entities(&stripped).into_owned()
}

/// Trims and sanitizes an optional field, treating blank input as absent.
pub fn clean_optional(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(sanitize_text)
        .filter(|t| !t.is_empty())
}

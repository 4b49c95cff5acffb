use anyhow::{anyhow, Context};
use chrono::Duration;

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 6;
pub const MAX_BIO_LENGTH: usize = 500;
pub const MAX_POST_LENGTH: usize = 5000;
pub const MAX_COMMENT_LENGTH: usize = 1000;

/// How many candidates are drawn before the suggestion list is truncated.
pub const SUGGESTION_SAMPLE_SIZE: usize = 10;
pub const SUGGESTED_USERS_LIMIT: usize = 5;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";
pub const MAX_TOKEN_EXPIRY_DAYS: i64 = 365;

const DEFAULT_ACCESS_TOKEN_EXPIRY: &str = "5h";
const DEFAULT_REFRESH_TOKEN_EXPIRY: &str = "15d";
const DEFAULT_SERVER_PORT: u16 = 5000;

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub access_token_secret: String,
    pub access_token_expiry: Duration,
    pub refresh_token_secret: String,
    pub refresh_token_expiry: Duration,
    pub cloudinary: Option<CloudinaryConfig>,
    pub server_port: u16,
    /// `Secure` is left off session cookies only in development.
    pub development: bool,
    pub seed_demo_data: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let access_token_secret = required("ACCESS_TOKEN_SECRET")?;
        let refresh_token_secret = required("REFRESH_TOKEN_SECRET")?;

        let access_token_expiry = expiry_var("ACCESS_TOKEN_EXPIRY", DEFAULT_ACCESS_TOKEN_EXPIRY)?;
        let refresh_token_expiry =
            expiry_var("REFRESH_TOKEN_EXPIRY", DEFAULT_REFRESH_TOKEN_EXPIRY)?;

        let cloudinary = match (
            optional("CLOUDINARY_CLOUD_NAME"),
            optional("CLOUDINARY_API_KEY"),
            optional("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            _ => None,
        };

        let server_port = match optional("SERVER_PORT") {
            Some(port) => port.parse::<u16>().context("invalid SERVER_PORT")?,
            None => DEFAULT_SERVER_PORT,
        };

        Ok(Self {
            database_url: optional("DATABASE_URL").unwrap_or_else(|| "memory://".to_string()),
            access_token_secret,
            access_token_expiry,
            refresh_token_secret,
            refresh_token_expiry,
            cloudinary,
            server_port,
            development: optional("APP_ENV").as_deref() == Some("development"),
            seed_demo_data: optional("FLOCK_SEED_DEMO").as_deref() == Some("true"),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required(key: &str) -> anyhow::Result<String> {
    optional(key).ok_or_else(|| anyhow!("{} must be set", key))
}

fn expiry_var(key: &str, default: &str) -> anyhow::Result<Duration> {
    let raw = optional(key).unwrap_or_else(|| default.to_string());
    parse_expiry(&raw).with_context(|| format!("invalid {}", key))
}

/// Parses expiries such as `30s`, `15m`, `5h`, `15d`, or a bare number of seconds.
/// Anything longer than [`MAX_TOKEN_EXPIRY_DAYS`] is rejected.
pub fn parse_expiry(raw: &str) -> anyhow::Result<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&raw[..idx], Some(c)),
        _ => (raw, None),
    };

    let amount: i64 = digits
        .parse()
        .map_err(|_| anyhow!("expected a number with an optional s/m/h/d suffix, got {:?}", raw))?;
    if amount <= 0 {
        return Err(anyhow!("expiry must be positive, got {:?}", raw));
    }

    let duration = match unit {
        None | Some('s') => Duration::try_seconds(amount),
        Some('m') => Duration::try_minutes(amount),
        Some('h') => Duration::try_hours(amount),
        Some('d') => Duration::try_days(amount),
        Some(other) => return Err(anyhow!("unknown expiry unit {:?}", other)),
    }
    .ok_or_else(|| anyhow!("expiry {:?} is out of range", raw))?;

    if duration > Duration::days(MAX_TOKEN_EXPIRY_DAYS) {
        return Err(anyhow!(
            "expiry {:?} exceeds the {} day maximum",
            raw,
            MAX_TOKEN_EXPIRY_DAYS
        ));
    }
    Ok(duration)
}

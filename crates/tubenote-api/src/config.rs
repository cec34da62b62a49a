use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Secrets that ship in sample env files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// How long a just-rotated refresh token is still honoured by requests
    /// that raced the rotation. Outside it, a replay counts as theft.
    pub refresh_grace: Duration,
    /// Public URL of the web client; links in emails point here.
    pub app_url: String,
    pub cors_origins: Vec<String>,
    pub cookie_secure: bool,
    /// Key rate limits on `X-Forwarded-For` instead of the socket peer.
    pub trust_proxy: bool,
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    pub youtube_api_key: Option<String>,
    pub mail: Option<MailConfig>,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

impl Config {
    /// Reads `TUBENOTE_*`, `YOUTUBE_API_KEY` and `MAIL_*` variables. Call
    /// `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        let access_secret = required_secret("TUBENOTE_ACCESS_SECRET")?;
        let refresh_secret = required_secret("TUBENOTE_REFRESH_SECRET")?;
        if access_secret == refresh_secret {
            bail!("TUBENOTE_ACCESS_SECRET and TUBENOTE_REFRESH_SECRET must differ");
        }

        let mail = match (var("MAIL_API_URL"), var("MAIL_API_KEY")) {
            (Some(api_url), Some(api_key)) => Some(MailConfig {
                api_url,
                api_key,
                from: var("MAIL_FROM").unwrap_or_else(|| "TubeNote <no-reply@tubenote.app>".into()),
            }),
            (None, None) => None,
            _ => bail!("MAIL_API_URL and MAIL_API_KEY must be set together"),
        };

        Ok(Self {
            host: var("TUBENOTE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed("TUBENOTE_PORT", 4000)?,
            db_path: var("TUBENOTE_DB_PATH").unwrap_or_else(|| "tubenote.db".into()).into(),
            access_secret,
            refresh_secret,
            access_ttl: Duration::from_secs(parsed("TUBENOTE_ACCESS_TTL_SECS", 15 * 60)?),
            refresh_ttl: Duration::from_secs(parsed("TUBENOTE_REFRESH_TTL_SECS", 7 * 24 * 3600)?),
            refresh_grace: Duration::from_secs(parsed("TUBENOTE_REFRESH_GRACE_SECS", 10)?),
            app_url: var("TUBENOTE_APP_URL")
                .unwrap_or_else(|| "http://localhost:3000".into())
                .trim_end_matches('/')
                .to_string(),
            cors_origins: var("TUBENOTE_CORS_ORIGINS")
                .unwrap_or_else(|| "http://localhost:3000".into())
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            cookie_secure: parsed("TUBENOTE_COOKIE_SECURE", false)?,
            trust_proxy: parsed("TUBENOTE_TRUST_PROXY", false)?,
            rate_limit_max: parsed("TUBENOTE_RATE_LIMIT_MAX", 10)?,
            rate_limit_window: Duration::from_secs(parsed("TUBENOTE_RATE_LIMIT_WINDOW_SECS", 900)?),
            youtube_api_key: var("YOUTUBE_API_KEY"),
            mail,
        })
    }

    /// Settings for in-process tests: in-memory friendly, offline, generous limits.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            db_path: ":memory:".into(),
            access_secret: "test-access-secret".into(),
            refresh_secret: "test-refresh-secret".into(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 3600),
            refresh_grace: Duration::from_secs(10),
            app_url: "http://localhost:3000".into(),
            cors_origins: vec!["http://localhost:3000".into()],
            cookie_secure: false,
            trust_proxy: false,
            rate_limit_max: 1000,
            rate_limit_window: Duration::from_secs(900),
            youtube_api_key: None,
            mail: None,
        }
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}

fn required_secret(key: &str) -> Result<String> {
    let secret = var(key).unwrap_or_default();
    if secret.is_empty() || PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
        bail!("{} is unset or still a placeholder; set it in your environment or .env file", key);
    }
    Ok(secret)
}

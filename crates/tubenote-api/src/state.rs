use std::sync::Arc;

use tubenote_db::Database;

use crate::config::Config;
use crate::error::ApiResult;
use crate::mail::Mailer;
use crate::ratelimit::RateLimiter;
use crate::tokens::Keys;
use crate::youtube::YouTubeClient;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub config: Config,
    pub keys: Keys,
    pub mailer: Mailer,
    pub youtube: YouTubeClient,
    pub limiter: RateLimiter,
}

impl AppStateInner {
    pub fn new(db: Database, config: Config) -> Self {
        Self {
            keys: Keys::new(&config),
            mailer: Mailer::from_config(&config),
            youtube: YouTubeClient::from_config(&config),
            limiter: RateLimiter::new(config.rate_limit_max, config.rate_limit_window),
            db,
            config,
        }
    }

    /// In-memory database, offline YouTube metadata, captured mail.
    #[cfg(test)]
    pub fn for_tests(config: Config) -> AppState {
        let db = Database::open_in_memory().unwrap();
        let mut inner = Self::new(db, config);
        inner.mailer = Mailer::Capture(Default::default());
        Arc::new(inner)
    }
}

/// Runs blocking work (SQLite, Argon2) off the async runtime.
pub async fn run_blocking<F, T>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&AppStateInner) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&*state)).await?
}

use std::time::Duration;

use tracing::{debug, info, warn};

use tubenote_api::state::AppState;

/// Background task that drops expired refresh/email tokens and elapsed
/// rate-limit windows.
pub async fn run_cleanup_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let db_state = state.clone();
        let pruned = tokio::task::spawn_blocking(move || {
            db_state.db.prune_expired_tokens(chrono::Utc::now().timestamp())
        })
        .await;

        match pruned {
            Ok(Ok(count)) if count > 0 => info!("Cleanup: pruned {} expired tokens", count),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("Cleanup error: {:#}", e),
            Err(e) => warn!("Cleanup task panicked: {}", e),
        }

        let windows = state.limiter.prune();
        if windows > 0 {
            debug!("Cleanup: dropped {} rate-limit windows", windows);
        }
    }
}

//! Access/refresh token pairs backed by the `refresh_tokens` table.
//!
//! Every function here touches SQLite, so call them through
//! [`run_blocking`](crate::state::run_blocking).

use tracing::{debug, info, warn};
use uuid::Uuid;

use tubenote_db::models::UserRow;
use tubenote_types::api::Claims;

use crate::error::{ApiError, ApiResult};
use crate::state::AppStateInner;
use crate::tokens::{constant_time_eq, digest};

const INVALID_REFRESH: ApiError = ApiError::Unauthorized("Session expired, please log in again");
const ACCOUNT_GONE: ApiError = ApiError::Unauthorized("Account no longer exists");

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub claims: Claims,
    pub access_token: String,
    pub refresh_token: String,
}

/// Mints a fresh pair and records the refresh token's digest under its `jti`.
pub fn issue(state: &AppStateInner, user_id: Uuid, username: &str) -> ApiResult<IssuedSession> {
    let (access_token, claims) = state.keys.create_access(user_id, username)?;
    let jti = Uuid::new_v4();
    let (refresh_token, expires_at) = state.keys.create_refresh(user_id, jti)?;
    state.db.insert_refresh_token(
        &jti.to_string(),
        &user_id.to_string(),
        &digest(&refresh_token),
        expires_at,
    )?;

    Ok(IssuedSession {
        claims,
        access_token,
        refresh_token,
    })
}

/// What presenting a refresh token earned the caller.
#[derive(Debug)]
pub enum Renewal {
    /// The token was live and has been exchanged for a new pair.
    Rotated(UserRow, IssuedSession),
    /// Another request from the same client rotated this token moments ago.
    /// The caller is who it claims to be but gets no pair of its own, so the
    /// session minted by that request stays the live one.
    Superseded(UserRow, Claims),
}

/// Exchanges a refresh token. The presented token is marked revoked; a
/// replay inside `refresh_grace` is [`Renewal::Superseded`], and any later
/// replay ends every session of its owner.
pub fn renew(state: &AppStateInner, refresh_token: &str) -> ApiResult<Renewal> {
    let claims = state.keys.verify_refresh(refresh_token).map_err(|_| INVALID_REFRESH)?;
    let jti = claims.jti.to_string();
    let user_id = claims.sub.to_string();

    let row = state.db.get_refresh_token(&jti)?.ok_or(INVALID_REFRESH)?;
    if row.user_id != user_id || !constant_time_eq(row.token_hash.as_bytes(), digest(refresh_token).as_bytes()) {
        return Err(INVALID_REFRESH);
    }
    let now = chrono::Utc::now().timestamp();
    if row.revoked {
        if within_grace(state, row.revoked_at, now) {
            return superseded(state, claims.sub);
        }
        let ended = state.db.delete_user_refresh_tokens(&user_id)?;
        warn!(user = %user_id, ended, "Refresh token reuse detected, ended all sessions");
        return Err(INVALID_REFRESH);
    }
    if row.expires_at <= now {
        return Err(INVALID_REFRESH);
    }
    // Lost a race with a concurrent refresh of the same token.
    if !state.db.revoke_refresh_token(&jti, now)? {
        if within_grace(state, Some(now), now) {
            return superseded(state, claims.sub);
        }
        return Err(INVALID_REFRESH);
    }

    let user = state.db.get_user_by_id(&user_id)?.ok_or(ACCOUNT_GONE)?;
    let session = issue(state, claims.sub, &user.username)?;
    info!(user = %user_id, "Session refreshed");
    Ok(Renewal::Rotated(user, session))
}

/// [`renew`] for callers that must hand back a new pair, such as the
/// refresh endpoint. A superseded token is a plain 401 there.
pub fn rotate(state: &AppStateInner, refresh_token: &str) -> ApiResult<(UserRow, IssuedSession)> {
    match renew(state, refresh_token)? {
        Renewal::Rotated(user, session) => Ok((user, session)),
        Renewal::Superseded(..) => Err(ApiError::Unauthorized("Session was already refreshed")),
    }
}

fn within_grace(state: &AppStateInner, revoked_at: Option<i64>, now: i64) -> bool {
    let grace = state.config.refresh_grace.as_secs() as i64;
    revoked_at.is_some_and(|at| now - at < grace)
}

fn superseded(state: &AppStateInner, user_id: Uuid) -> ApiResult<Renewal> {
    let user = state.db.get_user_by_id(&user_id.to_string())?.ok_or(ACCOUNT_GONE)?;
    let (_, claims) = state.keys.create_access(user_id, &user.username)?;
    debug!(user = %user_id, "Refresh token was just rotated by a concurrent request");
    Ok(Renewal::Superseded(user, claims))
}

/// Best effort: unknown or forged tokens are ignored.
pub fn revoke(state: &AppStateInner, refresh_token: &str) -> ApiResult<()> {
    if let Ok(claims) = state.keys.verify_refresh(refresh_token) {
        state.db.delete_refresh_token(&claims.jti.to_string())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::Config;
    use crate::state::{AppState, AppStateInner};

    fn setup_with_grace(grace: Duration) -> (AppState, UserRow) {
        let mut config = Config::for_tests();
        config.refresh_grace = grace;
        let state = AppStateInner::for_tests(config);
        let user = state
            .db
            .create_user(&Uuid::new_v4().to_string(), "alice", "alice@example.com", "$argon2id$fake")
            .unwrap();
        (state, user)
    }

    fn setup() -> (AppState, UserRow) {
        setup_with_grace(Duration::ZERO)
    }

    fn user_id(user: &UserRow) -> Uuid {
        user.id.parse().unwrap()
    }

    /// A refresh token signed with the right key whose row says otherwise.
    fn stored_token(state: &AppState, user: &UserRow, token_hash: Option<&str>, expires_at: i64) -> String {
        let jti = Uuid::new_v4();
        let (token, _) = state.keys.create_refresh(user_id(user), jti).unwrap();
        let hash = token_hash.map(str::to_string).unwrap_or_else(|| digest(&token));
        state
            .db
            .insert_refresh_token(&jti.to_string(), &user.id, &hash, expires_at)
            .unwrap();
        token
    }

    #[test]
    fn issued_pair_verifies() {
        let (state, user) = setup();
        let session = issue(&state, user_id(&user), &user.username).unwrap();
        let claims = state.keys.verify_access(&session.access_token).unwrap();
        assert_eq!(claims.sub, user_id(&user));
        assert_eq!(session.claims.username, "alice");
    }

    #[test]
    fn rotation_is_single_use_and_reuse_revokes_everything() {
        let (state, user) = setup();
        let first = issue(&state, user_id(&user), &user.username).unwrap();
        let other_device = issue(&state, user_id(&user), &user.username).unwrap();

        let (rotated_user, second) = rotate(&state, &first.refresh_token).unwrap();
        assert_eq!(rotated_user.id, user.id);
        assert_ne!(second.refresh_token, first.refresh_token);

        // replaying the spent token trips reuse detection
        assert!(rotate(&state, &first.refresh_token).is_err());
        assert!(rotate(&state, &second.refresh_token).is_err());
        assert!(rotate(&state, &other_device.refresh_token).is_err());
    }

    #[test]
    fn replay_inside_grace_is_superseded_not_reuse() {
        let (state, user) = setup_with_grace(Duration::from_secs(30));
        let first = issue(&state, user_id(&user), &user.username).unwrap();
        let (_, successor) = rotate(&state, &first.refresh_token).unwrap();

        match renew(&state, &first.refresh_token).unwrap() {
            Renewal::Superseded(row, claims) => {
                assert_eq!(row.id, user.id);
                assert_eq!(claims.sub, user_id(&user));
            }
            Renewal::Rotated(..) => panic!("spent token minted a second pair"),
        }
        // the refresh endpoint still refuses to mint from it
        assert!(rotate(&state, &first.refresh_token).is_err());

        // the session that won the rotation survives
        assert!(rotate(&state, &successor.refresh_token).is_ok());
    }

    #[test]
    fn expired_row_is_rejected() {
        let (state, user) = setup();
        let past = chrono::Utc::now().timestamp() - 60;
        let token = stored_token(&state, &user, None, past);

        let err = rotate(&state, &token).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
        let live = issue(&state, user_id(&user), &user.username).unwrap();
        // an expired token is not reuse, other sessions are untouched
        assert!(rotate(&state, &live.refresh_token).is_ok());
    }

    #[test]
    fn digest_mismatch_is_rejected() {
        let (state, user) = setup();
        let future = chrono::Utc::now().timestamp() + 3600;
        let token = stored_token(&state, &user, Some(&digest("some-other-token")), future);

        let err = rotate(&state, &token).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
        // a forged token does not spend the real row
        let jti = state.keys.verify_refresh(&token).unwrap().jti.to_string();
        assert!(!state.db.get_refresh_token(&jti).unwrap().unwrap().revoked);
    }

    #[test]
    fn revoked_token_cannot_rotate() {
        let (state, user) = setup();
        let session = issue(&state, user_id(&user), &user.username).unwrap();
        revoke(&state, &session.refresh_token).unwrap();
        assert!(rotate(&state, &session.refresh_token).is_err());
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let (state, user) = setup();
        let session = issue(&state, user_id(&user), &user.username).unwrap();
        assert!(rotate(&state, &session.access_token).is_err());
        // revoking garbage is a no-op
        assert!(revoke(&state, "not-a-jwt").is_ok());
    }

    #[test]
    fn deleted_account_cannot_refresh() {
        let (state, user) = setup();
        let session = issue(&state, user_id(&user), &user.username).unwrap();
        state.db.delete_user(&user.id).unwrap();
        assert!(rotate(&state, &session.refresh_token).is_err());
    }
}

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::info;

use tubenote_db::models::EmailTokenKind;
use tubenote_db::queries::ProfileChanges;
use tubenote_types::api::{
    AuthResponse, ChangePasswordRequest, Claims, DeleteAccountRequest, UpdateProfileRequest,
};
use tubenote_types::models::User;

use crate::auth::issue_email_token;
use crate::cookies;
use crate::error::{ApiError, ApiResult};
use crate::extract::JsonBody;
use crate::mail::verification_mail;
use crate::passwords::{hash_password, verify_password};
use crate::session;
use crate::state::{AppState, run_blocking};
use crate::validate;

const GONE: ApiError = ApiError::Unauthorized("Account no longer exists");

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<User>> {
    let id = claims.sub.to_string();
    let user = run_blocking(&state, move |s| s.db.get_user_by_id(&id)?.ok_or(GONE)).await?;
    Ok(Json(user.to_model()?))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    JsonBody(req): JsonBody<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let changes = ProfileChanges {
        username: req.username.as_deref().map(validate::username).transpose()?,
        email: req.email.as_deref().map(validate::email).transpose()?,
        profile_picture: req.profile_picture.as_deref().map(validate::profile_picture).transpose()?,
    };
    if changes.username.is_none() && changes.email.is_none() && changes.profile_picture.is_none() {
        return Err(ApiError::bad_request("No fields to update"));
    }

    let id = claims.sub.to_string();
    let (user, verify_token) = run_blocking(&state, move |s| {
        let current = s.db.get_user_by_id(&id)?.ok_or(GONE)?;
        if let Some(username) = &changes.username {
            if s.db.get_user_by_username(username)?.is_some_and(|u| u.id != id) {
                return Err(ApiError::Conflict("Username is already taken"));
            }
        }
        if let Some(email) = &changes.email {
            if s.db.get_user_by_email(email)?.is_some_and(|u| u.id != id) {
                return Err(ApiError::Conflict("Email is already registered"));
            }
        }

        let user = s
            .db
            .update_profile(&id, &changes)
            .map_err(ApiError::from_user_write)?
            .ok_or(GONE)?;
        let verify_token = if user.email != current.email {
            Some(issue_email_token(s, &user.id, EmailTokenKind::Verify)?)
        } else {
            None
        };
        Ok((user, verify_token))
    })
    .await?;

    if let Some(token) = verify_token {
        info!(user = %user.id, "Email changed, verification required");
        state
            .mailer
            .deliver(verification_mail(&state.config.app_url, &user.email, &user.username, &token))
            .await;
    }
    Ok(Json(user.to_model()?))
}

/// Every other session is signed out; the caller gets a fresh one.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    jar: CookieJar,
    JsonBody(req): JsonBody<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    validate::password(&req.new_password)?;

    let user_id = claims.sub;
    let (user, session) = run_blocking(&state, move |s| {
        let id = user_id.to_string();
        let user = s.db.get_user_by_id(&id)?.ok_or(GONE)?;
        if !verify_password(&req.current_password, &user.password) {
            return Err(ApiError::Unauthorized("Current password is incorrect"));
        }
        let password_hash = hash_password(&req.new_password)?;
        s.db.update_password(&id, &password_hash)?;
        s.db.delete_user_refresh_tokens(&id)?;
        let session = session::issue(s, user_id, &user.username)?;
        Ok((user, session))
    })
    .await?;

    info!(user = %user.id, "Password changed, other sessions revoked");
    Ok((
        cookies::set_session(jar, &state.config, &session),
        Json(AuthResponse {
            user: user.to_model()?,
            access_token: session.access_token,
        }),
    ))
}

/// Removes the account with its videos, notes and tokens.
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    jar: CookieJar,
    JsonBody(req): JsonBody<DeleteAccountRequest>,
) -> ApiResult<impl IntoResponse> {
    let id = claims.sub.to_string();
    let deleted_id = run_blocking(&state, move |s| {
        let user = s.db.get_user_by_id(&id)?.ok_or(GONE)?;
        if !verify_password(&req.password, &user.password) {
            return Err(ApiError::Unauthorized("Password is incorrect"));
        }
        s.db.delete_user(&id)?;
        Ok(id)
    })
    .await?;

    info!(user = %deleted_id, "Account deleted");
    Ok((StatusCode::NO_CONTENT, cookies::clear_session(jar)))
}

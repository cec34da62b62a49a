use std::time::Duration;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::info;
use uuid::Uuid;

use tubenote_db::models::EmailTokenKind;
use tubenote_types::api::{
    AuthResponse, AuthStatusResponse, Claims, CsrfResponse, ForgotPasswordRequest, LoginRequest,
    MessageResponse, RefreshRequest, RegisterRequest, ResetPasswordRequest, TokenRequest,
};

use crate::cookies::{self, REFRESH_COOKIE};
use crate::error::{ApiError, ApiResult};
use crate::extract::JsonBody;
use crate::mail::{password_reset_mail, verification_mail};
use crate::middleware::access_claims;
use crate::passwords::{hash_password, verify_dummy, verify_password};
use crate::session::{self, Renewal};
use crate::state::{AppState, AppStateInner, run_blocking};
use crate::tokens::{digest, random_token};
use crate::validate;

const VERIFY_TTL: Duration = Duration::from_secs(24 * 3600);
const RESET_TTL: Duration = Duration::from_secs(3600);

/// Stores the digest of a fresh email token and returns the token itself.
pub(crate) fn issue_email_token(
    s: &AppStateInner,
    user_id: &str,
    kind: EmailTokenKind,
) -> ApiResult<String> {
    let ttl = match kind {
        EmailTokenKind::Verify => VERIFY_TTL,
        EmailTokenKind::Reset => RESET_TTL,
    };
    let token = random_token();
    let expires_at = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
    s.db.replace_email_token(&Uuid::new_v4().to_string(), user_id, kind, &digest(&token), expires_at)?;
    Ok(token)
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let username = validate::username(&req.username)?;
    let email = validate::email(&req.email)?;
    validate::password(&req.password)?;

    let (user, session, verify_token) = run_blocking(&state, move |s| {
        if s.db.get_user_by_username(&username)?.is_some() {
            return Err(ApiError::Conflict("Username is already taken"));
        }
        if s.db.get_user_by_email(&email)?.is_some() {
            return Err(ApiError::Conflict("Email is already registered"));
        }

        let password_hash = hash_password(&req.password)?;
        let user_id = Uuid::new_v4();
        let user = s
            .db
            .create_user(&user_id.to_string(), &username, &email, &password_hash)
            .map_err(ApiError::from_user_write)?;
        let verify_token = issue_email_token(s, &user.id, EmailTokenKind::Verify)?;
        let session = session::issue(s, user_id, &user.username)?;
        Ok((user, session, verify_token))
    })
    .await?;

    info!(user = %user.id, username = %user.username, "User registered");
    state
        .mailer
        .deliver(verification_mail(&state.config.app_url, &user.email, &user.username, &verify_token))
        .await;

    Ok((
        StatusCode::CREATED,
        cookies::set_session(jar, &state.config, &session),
        Json(AuthResponse {
            user: user.to_model()?,
            access_token: session.access_token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    JsonBody(req): JsonBody<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let identifier = req.email.trim().to_string();
    let identifier = if identifier.contains('@') {
        identifier.to_lowercase()
    } else {
        identifier
    };

    let (user, session) = run_blocking(&state, move |s| {
        let verified = match s.db.get_user_by_login(&identifier)? {
            Some(user) => verify_password(&req.password, &user.password).then_some(user),
            None => {
                verify_dummy(&req.password);
                None
            }
        };
        let user = verified.ok_or(ApiError::Unauthorized("Invalid email or password"))?;
        let user_id: Uuid = user.id.parse().map_err(anyhow::Error::from)?;
        let session = session::issue(s, user_id, &user.username)?;
        Ok((user, session))
    })
    .await?;

    info!(user = %user.id, "User logged in");
    Ok((
        cookies::set_session(jar, &state.config, &session),
        Json(AuthResponse {
            user: user.to_model()?,
            access_token: session.access_token,
        }),
    ))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> ApiResult<impl IntoResponse> {
    if let Some(refresh_token) = cookies::value(&jar, REFRESH_COOKIE) {
        run_blocking(&state, move |s| session::revoke(s, &refresh_token)).await?;
    }
    Ok((cookies::clear_session(jar), Json(MessageResponse::new("Logged out"))))
}

/// Takes the refresh token from its cookie, or from the body for clients
/// that cannot hold cookies.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let from_body = if body.iter().all(u8::is_ascii_whitespace) {
        RefreshRequest::default()
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))?
    };
    let refresh_token = cookies::value(&jar, REFRESH_COOKIE)
        .or(from_body.refresh_token)
        .ok_or(ApiError::Unauthorized("No refresh token"))?;

    let (user, session) = run_blocking(&state, move |s| session::rotate(s, &refresh_token)).await?;
    Ok((
        cookies::set_session(jar, &state.config, &session),
        Json(AuthResponse {
            user: user.to_model()?,
            access_token: session.access_token,
        }),
    ))
}

pub async fn csrf(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let token = random_token();
    (
        cookies::set_csrf(jar, &state.config, token.clone()),
        Json(CsrfResponse { csrf_token: token }),
    )
}

/// Never fails for anonymous callers. A stale access token is renewed from
/// the refresh cookie when possible.
pub async fn status(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let anonymous = AuthStatusResponse {
        is_authenticated: false,
        user: None,
    };

    if let Some(claims) = access_claims(&state, &headers, &jar) {
        let id = claims.sub.to_string();
        let user = run_blocking(&state, move |s| Ok(s.db.get_user_by_id(&id)?)).await?;
        let body = match user {
            Some(user) => AuthStatusResponse {
                is_authenticated: true,
                user: Some(user.to_model()?),
            },
            None => anonymous,
        };
        return Ok(Json(body).into_response());
    }

    let Some(refresh_token) = cookies::value(&jar, REFRESH_COOKIE) else {
        return Ok(Json(anonymous).into_response());
    };
    match run_blocking(&state, move |s| session::renew(s, &refresh_token)).await {
        Ok(Renewal::Rotated(user, session)) => {
            let body = AuthStatusResponse {
                is_authenticated: true,
                user: Some(user.to_model()?),
            };
            Ok((cookies::set_session(jar, &state.config, &session), Json(body)).into_response())
        }
        Ok(Renewal::Superseded(user, _)) => {
            let body = AuthStatusResponse {
                is_authenticated: true,
                user: Some(user.to_model()?),
            };
            Ok(Json(body).into_response())
        }
        Err(e) if e.is_operational() => Ok((cookies::clear_session(jar), Json(anonymous)).into_response()),
        Err(e) => Err(e),
    }
}

pub async fn verify_email(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TokenRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let user_id = run_blocking(&state, move |s| {
        let now = chrono::Utc::now().timestamp();
        let user_id = s
            .db
            .consume_email_token(EmailTokenKind::Verify, &digest(req.token.trim()), now)?
            .ok_or_else(|| ApiError::bad_request("Verification link is invalid or has expired"))?;
        s.db.set_email_verified(&user_id)?;
        Ok(user_id)
    })
    .await?;

    info!(user = %user_id, "Email verified");
    Ok(Json(MessageResponse::new("Email verified")))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MessageResponse>> {
    let id = claims.sub.to_string();
    let (user, token) = run_blocking(&state, move |s| {
        let user = s
            .db
            .get_user_by_id(&id)?
            .ok_or(ApiError::Unauthorized("Account no longer exists"))?;
        if user.is_email_verified {
            return Err(ApiError::Conflict("Email is already verified"));
        }
        let token = issue_email_token(s, &user.id, EmailTokenKind::Verify)?;
        Ok((user, token))
    })
    .await?;

    state
        .mailer
        .deliver(verification_mail(&state.config.app_url, &user.email, &user.username, &token))
        .await;
    Ok(Json(MessageResponse::new("Verification email sent")))
}

/// Answers the same whether or not the address belongs to an account.
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let email = validate::email(&req.email)?;

    let issued = run_blocking(&state, move |s| {
        let Some(user) = s.db.get_user_by_email(&email)? else {
            return Ok(None);
        };
        let token = issue_email_token(s, &user.id, EmailTokenKind::Reset)?;
        Ok(Some((user, token)))
    })
    .await?;

    if let Some((user, token)) = issued {
        info!(user = %user.id, "Password reset requested");
        state
            .mailer
            .deliver(password_reset_mail(&state.config.app_url, &user.email, &user.username, &token))
            .await;
    }
    Ok(Json(MessageResponse::new(
        "If an account exists for that email, a reset link has been sent",
    )))
}

pub async fn reset_password(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ResetPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    validate::password(&req.password)?;

    let user_id = run_blocking(&state, move |s| {
        let now = chrono::Utc::now().timestamp();
        let user_id = s
            .db
            .consume_email_token(EmailTokenKind::Reset, &digest(req.token.trim()), now)?
            .ok_or_else(|| ApiError::bad_request("Reset link is invalid or has expired"))?;
        let password_hash = hash_password(&req.password)?;
        s.db.update_password(&user_id, &password_hash)?;
        s.db.delete_user_refresh_tokens(&user_id)?;
        Ok(user_id)
    })
    .await?;

    info!(user = %user_id, "Password reset, all sessions revoked");
    Ok(Json(MessageResponse::new("Password has been reset, please log in")))
}

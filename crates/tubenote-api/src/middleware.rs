use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::{debug, warn};

use tubenote_types::api::Claims;

use crate::cookies::{self, ACCESS_COOKIE, CSRF_COOKIE, CSRF_HEADER, REFRESH_COOKIE};
use crate::error::ApiError;
use crate::session::{self, Renewal};
use crate::state::{AppState, run_blocking};
use crate::tokens::constant_time_eq;

/// Claims from a valid access token, taken from the Bearer header or,
/// failing that, the access cookie.
pub fn access_claims(state: &AppState, headers: &HeaderMap, jar: &CookieJar) -> Option<Claims> {
    let bearer = headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string());
    [bearer, cookies::value(jar, ACCESS_COOKIE)]
        .into_iter()
        .flatten()
        .find_map(|token| state.keys.verify_access(&token).ok())
}

/// Resolves the caller into a `Claims` extension. An expired access token is
/// replaced transparently when the refresh cookie still holds a live token.
/// Parallel requests that carried the same refresh cookie are let through on
/// the cookies the first of them received.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(claims) = access_claims(&state, req.headers(), &jar) {
        req.extensions_mut().insert(claims);
        return next.run(req).await;
    }

    let Some(refresh_token) = cookies::value(&jar, REFRESH_COOKIE) else {
        return ApiError::Unauthorized("Authentication required").into_response();
    };

    match run_blocking(&state, move |s| session::renew(s, &refresh_token)).await {
        Ok(Renewal::Rotated(_, session)) => {
            debug!(user = %session.claims.sub, "Access token renewed from refresh cookie");
            req.extensions_mut().insert(session.claims.clone());
            let response = next.run(req).await;
            // The handler issued its own session (password change); keep that one.
            if sets_cookie(&response, REFRESH_COOKIE) {
                return response;
            }
            (cookies::set_session(jar, &state.config, &session), response).into_response()
        }
        Ok(Renewal::Superseded(_, claims)) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => (cookies::clear_session(jar), e).into_response(),
    }
}

fn sets_cookie(response: &Response, name: &str) -> bool {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&prefix))
}

/// Double-submit check for unsafe requests that ride on session cookies.
/// Bearer-only clients carry no ambient credentials and pass through.
pub async fn verify_csrf(jar: CookieJar, req: Request, next: Next) -> Result<Response, ApiError> {
    let has_session = jar.get(ACCESS_COOKIE).is_some() || jar.get(REFRESH_COOKIE).is_some();
    if is_safe(req.method()) || !has_session {
        return Ok(next.run(req).await);
    }

    let cookie = cookies::value(&jar, CSRF_COOKIE);
    let header = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    match (cookie, header) {
        (Some(cookie), Some(header)) if constant_time_eq(cookie.as_bytes(), header.as_bytes()) => {
            Ok(next.run(req).await)
        }
        _ => {
            warn!(method = %req.method(), path = %req.uri().path(), "CSRF check failed");
            Err(ApiError::Forbidden("Invalid or missing CSRF token"))
        }
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

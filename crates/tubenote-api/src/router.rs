use axum::{
    Json, Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::{get, patch, post},
};
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::Config;
use crate::cookies::CSRF_HEADER;
use crate::error::ApiError;
use crate::middleware::{require_auth, verify_csrf};
use crate::ratelimit::limit_by_client;
use crate::state::AppState;
use crate::{auth, notes, users, videos};

pub fn router(state: AppState) -> Router {
    // Credential endpoints share one attempt budget per client.
    let limited = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route_layer(middleware::from_fn_with_state(state.clone(), limit_by_client));

    let public = Router::new()
        .route("/health", get(health))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/csrf", get(auth::csrf))
        .route("/auth/status", get(auth::status));

    let protected = Router::new()
        .route("/auth/resend-verification", post(auth::resend_verification))
        .route(
            "/users/me",
            get(users::me).patch(users::update_me).delete(users::delete_me),
        )
        .route("/users/me/password", patch(users::change_password))
        .route("/videos", post(videos::create_video).get(videos::list_videos))
        // GET takes a YouTube id, DELETE the record id.
        .route("/videos/{id}", get(videos::get_video).delete(videos::delete_video))
        .route("/notes", post(notes::create_note).get(notes::list_notes))
        .route(
            "/notes/{id}",
            get(notes::get_note).patch(notes::update_note).delete(notes::delete_note),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(limited)
        .merge(public)
        .merge(protected)
        .fallback(|| async { ApiError::NotFound("Route not found") })
        .layer(middleware::from_fn(verify_csrf))
        .layer(cors(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn cors(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(CSRF_HEADER),
        ])
        .allow_credentials(true)
}

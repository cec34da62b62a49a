use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use tubenote_db::models::{VideoRow, now_timestamp};
use tubenote_types::api::{Claims, CreateVideoRequest};
use tubenote_types::models::Video;

use crate::error::{ApiError, ApiResult};
use crate::extract::{JsonBody, PathParam};
use crate::state::{AppState, run_blocking};
use crate::youtube::parse_video_id;

/// Saves a video for the caller. Saving one that is already saved returns
/// the existing record with 200 instead of 201.
pub async fn create_video(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    JsonBody(req): JsonBody<CreateVideoRequest>,
) -> ApiResult<impl IntoResponse> {
    let input = req
        .url
        .or(req.youtube_id)
        .ok_or_else(|| ApiError::bad_request("url or youtubeId is required"))?;
    let youtube_id = parse_video_id(&input)
        .ok_or_else(|| ApiError::bad_request("url is not a valid YouTube link or video id"))?;
    let user_id = claims.sub.to_string();

    let (uid, yid) = (user_id.clone(), youtube_id.clone());
    if let Some(existing) =
        run_blocking(&state, move |s| Ok(s.db.get_video_by_youtube_id(&uid, &yid)?)).await?
    {
        return Ok((StatusCode::OK, Json(existing.to_model()?)));
    }

    let metadata = state.youtube.fetch(&youtube_id).await?;
    let row = VideoRow {
        id: Uuid::new_v4().to_string(),
        youtube_id,
        user_id,
        snippet: metadata.snippet.to_string(),
        statistics: metadata.statistics.to_string(),
        player: metadata.player.to_string(),
        created_at: now_timestamp(),
    };

    let (row, created) = run_blocking(&state, move |s| match s.db.insert_video(&row) {
        Ok(()) => Ok((row, true)),
        // A concurrent request saved the same video first.
        Err(e) => match s.db.get_video_by_youtube_id(&row.user_id, &row.youtube_id)? {
            Some(existing) => Ok((existing, false)),
            None => Err(e.into()),
        },
    })
    .await?;

    let status = if created {
        info!(user = %row.user_id, youtube_id = %row.youtube_id, "Video saved");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(row.to_model()?)))
}

pub async fn list_videos(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Video>>> {
    let user_id = claims.sub.to_string();
    let rows = run_blocking(&state, move |s| Ok(s.db.list_videos(&user_id)?)).await?;
    let videos = rows.iter().map(VideoRow::to_model).collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Json(videos))
}

pub async fn get_video(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(youtube_id): PathParam<String>,
) -> ApiResult<Json<Video>> {
    let user_id = claims.sub.to_string();
    let row = run_blocking(&state, move |s| {
        s.db.get_video_by_youtube_id(&user_id, &youtube_id)?
            .ok_or(ApiError::NotFound("Video not found"))
    })
    .await?;
    Ok(Json(row.to_model()?))
}

/// Notes on the video go with it.
pub async fn delete_video(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<StatusCode> {
    let user_id = claims.sub.to_string();
    let video_id = id.to_string();
    let deleted = run_blocking(&state, move |s| Ok(s.db.delete_video(&user_id, &video_id)?)).await?;
    if !deleted {
        return Err(ApiError::NotFound("Video not found"));
    }
    info!(user = %claims.sub, video = %id, "Video deleted");
    Ok(StatusCode::NO_CONTENT)
}

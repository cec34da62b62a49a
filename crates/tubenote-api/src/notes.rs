use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;

use tubenote_db::models::{NoteRow, now_timestamp};
use tubenote_db::queries::{NoteChanges, NoteFilter};
use tubenote_types::api::{Claims, CreateNoteRequest, NoteQuery, UpdateNoteRequest};
use tubenote_types::models::Note;

use crate::error::{ApiError, ApiResult};
use crate::extract::{JsonBody, PathParam, QueryParams};
use crate::state::{AppState, run_blocking};
use crate::validate;
use crate::youtube::parse_video_id;

const NOT_FOUND: ApiError = ApiError::NotFound("Note not found");

/// The video must already be saved by the caller; its title and thumbnail
/// are copied onto the note.
pub async fn create_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    JsonBody(req): JsonBody<CreateNoteRequest>,
) -> ApiResult<(StatusCode, Json<Note>)> {
    let youtube_id = parse_video_id(&req.youtube_id)
        .ok_or_else(|| ApiError::bad_request("youtubeId is not a valid YouTube video id"))?;
    let title = validate::note_title(req.title.as_deref().unwrap_or_default())?;
    let content = validate::note_content(&req.content)?;
    let timestamp = validate::timestamp(req.timestamp)?;
    let user_id = claims.sub.to_string();

    let row = run_blocking(&state, move |s| {
        let video = s
            .db
            .get_video_by_youtube_id(&user_id, &youtube_id)?
            .ok_or(ApiError::NotFound("Video not found, save it before adding notes"))?
            .to_model()?;

        let now = now_timestamp();
        let row = NoteRow {
            id: Uuid::new_v4().to_string(),
            user_id,
            video_id: video.id.to_string(),
            youtube_id,
            title,
            content,
            video_title: video.title().to_string(),
            thumbnail: video.thumbnail().map(str::to_string),
            timestamp,
            created_at: now.clone(),
            updated_at: now,
        };
        s.db.insert_note(&row)?;
        Ok(row)
    })
    .await?;

    info!(user = %claims.sub, note = %row.id, youtube_id = %row.youtube_id, "Note created");
    Ok((StatusCode::CREATED, Json(row.to_model()?)))
}

/// `?videoId=` wins over `?youtubeId=` when both are given. `youtubeId`
/// accepts the same links as note creation.
pub async fn list_notes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    QueryParams(query): QueryParams<NoteQuery>,
) -> ApiResult<Json<Vec<Note>>> {
    let filter = match (query.video_id, query.youtube_id) {
        (Some(video_id), _) => NoteFilter::Video(video_id.to_string()),
        (None, Some(youtube_id)) if !youtube_id.trim().is_empty() => NoteFilter::YoutubeId(
            parse_video_id(&youtube_id)
                .ok_or_else(|| ApiError::bad_request("youtubeId is not a valid YouTube video id"))?,
        ),
        _ => NoteFilter::All,
    };
    let user_id = claims.sub.to_string();

    let rows = run_blocking(&state, move |s| Ok(s.db.list_notes(&user_id, &filter)?)).await?;
    let notes = rows.iter().map(NoteRow::to_model).collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Json(notes))
}

pub async fn get_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<Json<Note>> {
    let user_id = claims.sub.to_string();
    let row = run_blocking(&state, move |s| {
        s.db.get_note(&user_id, &id.to_string())?.ok_or(NOT_FOUND)
    })
    .await?;
    Ok(Json(row.to_model()?))
}

/// Only the supplied fields change.
pub async fn update_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(req): JsonBody<UpdateNoteRequest>,
) -> ApiResult<Json<Note>> {
    if req.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    let changes = NoteChanges {
        title: req.title.as_deref().map(validate::note_title).transpose()?,
        content: req.content.as_deref().map(validate::note_content).transpose()?,
        timestamp: req.timestamp.map(validate::timestamp).transpose()?,
    };
    let user_id = claims.sub.to_string();

    let row = run_blocking(&state, move |s| {
        s.db.update_note(&user_id, &id.to_string(), &changes)?.ok_or(NOT_FOUND)
    })
    .await?;
    Ok(Json(row.to_model()?))
}

pub async fn delete_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(id): PathParam<Uuid>,
) -> ApiResult<StatusCode> {
    let user_id = claims.sub.to_string();
    let deleted = run_blocking(&state, move |s| Ok(s.db.delete_note(&user_id, &id.to_string())?)).await?;
    if !deleted {
        return Err(NOT_FOUND);
    }
    info!(user = %claims.sub, note = %id, "Note deleted");
    Ok(StatusCode::NO_CONTENT)
}

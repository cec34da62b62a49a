//! Database row types. These map directly to SQLite rows and stay distinct
//! from the tubenote-types models so the storage layer can change freely.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use tubenote_types::models::{Note, User, Video};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub profile_picture: Option<String>,
    pub is_email_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct VideoRow {
    pub id: String,
    pub youtube_id: String,
    pub user_id: String,
    pub snippet: String,
    pub statistics: String,
    pub player: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NoteRow {
    pub id: String,
    pub user_id: String,
    pub video_id: String,
    pub youtube_id: String,
    pub title: String,
    pub content: String,
    pub video_title: String,
    pub thumbnail: Option<String>,
    pub timestamp: f64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRow {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: i64,
    pub revoked: bool,
    /// Unix time of rotation, set together with `revoked`.
    pub revoked_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTokenKind {
    Verify,
    Reset,
}

impl EmailTokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Reset => "reset",
        }
    }
}

/// Timestamp format used for every TEXT time column. Fixed width, so string
/// order matches time order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by hand through the sqlite shell use datetime('now').
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("invalid timestamp '{}'", raw))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("invalid id '{}'", raw))
}

fn parse_json(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!("Corrupt JSON column: {}", e);
        serde_json::Value::Object(Default::default())
    })
}

impl UserRow {
    pub fn to_model(&self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            username: self.username.clone(),
            email: self.email.clone(),
            profile_picture: self.profile_picture.clone(),
            is_email_verified: self.is_email_verified,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

impl VideoRow {
    pub fn to_model(&self) -> Result<Video> {
        Ok(Video {
            id: parse_id(&self.id)?,
            youtube_id: self.youtube_id.clone(),
            user_id: parse_id(&self.user_id)?,
            snippet: parse_json(&self.snippet),
            statistics: parse_json(&self.statistics),
            player: parse_json(&self.player),
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

impl NoteRow {
    pub fn to_model(&self) -> Result<Note> {
        Ok(Note {
            id: parse_id(&self.id)?,
            user_id: parse_id(&self.user_id)?,
            video_id: parse_id(&self.video_id)?,
            youtube_id: self.youtube_id.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            video_title: self.video_title.clone(),
            thumbnail: self.thumbnail.clone(),
            timestamp: self.timestamp,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_timestamp_formats() {
        let a = parse_timestamp("2024-03-01T12:30:00.250Z").unwrap();
        let b = parse_timestamp("2024-03-01 12:30:00").unwrap();
        assert_eq!((a - b).num_milliseconds(), 250);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn corrupt_json_becomes_empty_object() {
        let row = VideoRow {
            id: Uuid::new_v4().to_string(),
            youtube_id: "dQw4w9WgXcQ".into(),
            user_id: Uuid::new_v4().to_string(),
            snippet: "{not json".into(),
            statistics: "{}".into(),
            player: "{}".into(),
            created_at: now_timestamp(),
        };
        let video = row.to_model().unwrap();
        assert!(video.snippet.as_object().unwrap().is_empty());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public view of an account. The password hash never leaves the db crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A YouTube video saved by a user, with the metadata cached at save time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: Uuid,
    pub youtube_id: String,
    pub user_id: Uuid,
    pub snippet: serde_json::Value,
    pub statistics: serde_json::Value,
    pub player: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Video {
    pub fn title(&self) -> &str {
        self.snippet
            .get("title")
            .and_then(|t| t.as_str())
            .unwrap_or(&self.youtube_id)
    }

    /// Best available thumbnail URL, largest first.
    pub fn thumbnail(&self) -> Option<&str> {
        let thumbs = self.snippet.get("thumbnails")?;
        ["maxres", "standard", "high", "medium", "default"]
            .iter()
            .find_map(|size| thumbs.get(size)?.get("url")?.as_str())
    }
}

/// A timestamped note written against a saved video.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub user_id: Uuid,
    pub video_id: Uuid,
    pub youtube_id: String,
    pub title: String,
    pub content: String,
    pub video_title: String,
    pub thumbnail: Option<String>,
    /// Seconds into the video.
    pub timestamp: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

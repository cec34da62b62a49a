use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const ID_LEN: usize = 11;

/// Extracts the 11-character video id from a pasted link or a bare id.
///
/// Accepts `youtube.com/watch?v=`, `youtu.be/`, `/embed/`, `/shorts/`,
/// `/live/` and `/v/` forms on the www, m and music hosts.
pub fn parse_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if is_video_id(input) {
        return Some(input.to_string());
    }

    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };
    let url = reqwest::Url::parse(&with_scheme).ok()?;
    let host = url.host_str()?.trim_start_matches("www.");

    let candidate = match host {
        "youtu.be" => url.path_segments()?.next().map(str::to_string),
        "youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
            let mut segments = url.path_segments()?;
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.into_owned()),
                Some("embed" | "shorts" | "live" | "v") => segments.next().map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    }?;

    is_video_id(&candidate).then_some(candidate)
}

fn is_video_id(s: &str) -> bool {
    s.len() == ID_LEN && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// The three metadata parts cached on a saved video.
#[derive(Debug, Clone)]
pub struct VideoMetadata {
    pub snippet: Value,
    pub statistics: Value,
    pub player: Value,
}

#[derive(Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Deserialize)]
struct VideoItem {
    #[serde(default)]
    snippet: Value,
    #[serde(default)]
    statistics: Value,
    #[serde(default)]
    player: Value,
}

pub enum YouTubeClient {
    /// YouTube Data API v3.
    Api {
        http: reqwest::Client,
        api_key: String,
        base_url: String,
    },
    /// No API key configured: metadata is synthesized from the id alone.
    Offline,
}

impl YouTubeClient {
    pub fn from_config(config: &Config) -> Self {
        match &config.youtube_api_key {
            Some(key) => Self::Api {
                http: reqwest::Client::new(),
                api_key: key.clone(),
                base_url: YOUTUBE_API_BASE.to_string(),
            },
            None => Self::Offline,
        }
    }

    pub async fn fetch(&self, youtube_id: &str) -> ApiResult<VideoMetadata> {
        match self {
            Self::Offline => Ok(offline_metadata(youtube_id)),
            Self::Api {
                http,
                api_key,
                base_url,
            } => {
                let response = http
                    .get(format!("{}/videos", base_url))
                    .query(&[
                        ("part", "snippet,statistics,player"),
                        ("id", youtube_id),
                        ("key", api_key.as_str()),
                    ])
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| {
                        warn!("YouTube request for {} failed: {}", youtube_id, e.without_url());
                        ApiError::Upstream("Could not reach YouTube".into())
                    })?;

                let body: VideoListResponse = response.json().await.map_err(|e| {
                    warn!("Unexpected YouTube response for {}: {}", youtube_id, e.without_url());
                    ApiError::Upstream("Unexpected response from YouTube".into())
                })?;

                let item = body
                    .items
                    .into_iter()
                    .next()
                    .ok_or(ApiError::NotFound("Video not found on YouTube"))?;

                Ok(VideoMetadata {
                    snippet: item.snippet,
                    statistics: item.statistics,
                    player: item.player,
                })
            }
        }
    }
}

fn offline_metadata(youtube_id: &str) -> VideoMetadata {
    let thumb = |name: &str, width: u32, height: u32| {
        json!({
            "url": format!("https://i.ytimg.com/vi/{}/{}.jpg", youtube_id, name),
            "width": width,
            "height": height,
        })
    };
    VideoMetadata {
        snippet: json!({
            "title": youtube_id,
            "thumbnails": {
                "default": thumb("default", 120, 90),
                "medium": thumb("mqdefault", 320, 180),
                "high": thumb("hqdefault", 480, 360),
            },
        }),
        statistics: json!({}),
        player: json!({
            "embedHtml": format!(
                "<iframe width=\"480\" height=\"270\" src=\"//www.youtube.com/embed/{}\" \
                 frameborder=\"0\" allowfullscreen></iframe>",
                youtube_id
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "dQw4w9WgXcQ";

    #[test]
    fn parses_every_link_shape() {
        let inputs = [
            "dQw4w9WgXcQ",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42s",
            "youtube.com/watch?v=dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://music.youtube.com/watch?v=dQw4w9WgXcQ&list=RD",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?t=10",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/live/dQw4w9WgXcQ?si=abc",
            "  https://youtu.be/dQw4w9WgXcQ  ",
        ];
        for input in inputs {
            assert_eq!(parse_video_id(input).as_deref(), Some(ID), "input: {}", input);
        }
    }

    #[test]
    fn rejects_non_video_links() {
        let inputs = [
            "",
            "dQw4w9WgXc",
            "dQw4w9WgXcQQ",
            "https://vimeo.com/123456789",
            "https://www.youtube.com/channel/UC38IQsAvIsxxjztdMZQtwHA",
            "https://www.youtube.com/watch?v=short",
            "https://www.youtube.com/watch?list=PL123",
            "https://evil.example.com/watch?v=dQw4w9WgXcQ",
            "not a url at all",
        ];
        for input in inputs {
            assert_eq!(parse_video_id(input), None, "input: {}", input);
        }
    }

    #[tokio::test]
    async fn offline_client_synthesizes_metadata() {
        let meta = YouTubeClient::Offline.fetch(ID).await.unwrap();
        assert_eq!(meta.snippet["title"], ID);
        assert_eq!(
            meta.snippet["thumbnails"]["high"]["url"],
            "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg"
        );
        assert!(meta.player["embedHtml"].as_str().unwrap().contains("/embed/dQw4w9WgXcQ"));
    }
}

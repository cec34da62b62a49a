use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

use crate::Database;
use crate::models::VideoRow;

const VIDEO_COLUMNS: &str = "id, youtube_id, user_id, snippet, statistics, player, created_at";

impl Database {
    pub fn insert_video(&self, video: &VideoRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO videos (id, youtube_id, user_id, snippet, statistics, player, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    video.id,
                    video.youtube_id,
                    video.user_id,
                    video.snippet,
                    video.statistics,
                    video.player,
                    video.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_video(&self, user_id: &str, id: &str) -> Result<Option<VideoRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM videos WHERE id = ?1 AND user_id = ?2", VIDEO_COLUMNS);
            Ok(conn.query_row(&sql, [id, user_id], video_from_row).optional()?)
        })
    }

    pub fn get_video_by_youtube_id(&self, user_id: &str, youtube_id: &str) -> Result<Option<VideoRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM videos WHERE youtube_id = ?1 AND user_id = ?2",
                VIDEO_COLUMNS
            );
            Ok(conn.query_row(&sql, [youtube_id, user_id], video_from_row).optional()?)
        })
    }

    /// Newest first.
    pub fn list_videos(&self, user_id: &str) -> Result<Vec<VideoRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM videos WHERE user_id = ?1 ORDER BY created_at DESC",
                VIDEO_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], video_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Notes on the video are removed with it (ON DELETE CASCADE).
    pub fn delete_video(&self, user_id: &str, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM videos WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(n > 0)
        })
    }
}

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<VideoRow> {
    Ok(VideoRow {
        id: row.get(0)?,
        youtube_id: row.get(1)?,
        user_id: row.get(2)?,
        snippet: row.get(3)?,
        statistics: row.get(4)?,
        player: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    #[test]
    fn videos_are_scoped_to_their_owner() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        let video = fixtures::video(&db, &alice.id, "dQw4w9WgXcQ");

        assert!(db.get_video(&alice.id, &video.id).unwrap().is_some());
        assert!(db.get_video(&bob.id, &video.id).unwrap().is_none());
        assert!(db.get_video_by_youtube_id(&bob.id, "dQw4w9WgXcQ").unwrap().is_none());
        assert!(!db.delete_video(&bob.id, &video.id).unwrap());
        assert_eq!(db.list_videos(&alice.id).unwrap().len(), 1);
    }

    #[test]
    fn same_video_can_be_saved_by_two_users_but_not_twice() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        let first = fixtures::video(&db, &alice.id, "dQw4w9WgXcQ");
        fixtures::video(&db, &bob.id, "dQw4w9WgXcQ");

        let mut dup = first.clone();
        dup.id = "another-id".into();
        assert!(db.insert_video(&dup).is_err());
    }
}

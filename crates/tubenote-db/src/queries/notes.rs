use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

use crate::Database;
use crate::models::{NoteRow, now_timestamp};

const NOTE_COLUMNS: &str = "id, user_id, video_id, youtube_id, title, content, video_title, \
                            thumbnail, timestamp, created_at, updated_at";

/// Which of a user's notes to list.
#[derive(Debug, Clone, Default)]
pub enum NoteFilter {
    #[default]
    All,
    Video(String),
    YoutubeId(String),
}

/// Fields a PATCH may touch. `None` leaves the column as it is.
#[derive(Debug, Clone, Default)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub timestamp: Option<f64>,
}

impl Database {
    pub fn insert_note(&self, note: &NoteRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notes (id, user_id, video_id, youtube_id, title, content, video_title,
                                    thumbnail, timestamp, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    note.id,
                    note.user_id,
                    note.video_id,
                    note.youtube_id,
                    note.title,
                    note.content,
                    note.video_title,
                    note.thumbnail,
                    note.timestamp,
                    note.created_at,
                    note.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_note(&self, user_id: &str, id: &str) -> Result<Option<NoteRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM notes WHERE id = ?1 AND user_id = ?2", NOTE_COLUMNS);
            Ok(conn.query_row(&sql, [id, user_id], note_from_row).optional()?)
        })
    }

    /// Notes on one video come back in playback order; the full list is newest first.
    pub fn list_notes(&self, user_id: &str, filter: &NoteFilter) -> Result<Vec<NoteRow>> {
        self.with_conn(|conn| {
            let (clause, value) = match filter {
                NoteFilter::All => ("", None),
                NoteFilter::Video(id) => (" AND video_id = ?2", Some(id.as_str())),
                NoteFilter::YoutubeId(id) => (" AND youtube_id = ?2", Some(id.as_str())),
            };
            let order = if value.is_some() {
                "timestamp ASC, created_at ASC"
            } else {
                "created_at DESC"
            };
            let sql = format!(
                "SELECT {} FROM notes WHERE user_id = ?1{} ORDER BY {}",
                NOTE_COLUMNS, clause, order
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = match value {
                Some(v) => stmt.query_map([user_id, v], note_from_row)?,
                None => stmt.query_map([user_id], note_from_row)?,
            }
            .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Applies only the supplied fields. Returns the updated note, or `None`
    /// if the caller owns no such note.
    pub fn update_note(&self, user_id: &str, id: &str, changes: &NoteChanges) -> Result<Option<NoteRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let n = tx.execute(
                "UPDATE notes
                 SET title = COALESCE(?1, title),
                     content = COALESCE(?2, content),
                     timestamp = COALESCE(?3, timestamp),
                     updated_at = ?4
                 WHERE id = ?5 AND user_id = ?6",
                params![changes.title, changes.content, changes.timestamp, now_timestamp(), id, user_id],
            )?;
            if n == 0 {
                return Ok(None);
            }
            let sql = format!("SELECT {} FROM notes WHERE id = ?1", NOTE_COLUMNS);
            let row = tx.query_row(&sql, [id], note_from_row)?;
            tx.commit()?;
            Ok(Some(row))
        })
    }

    pub fn delete_note(&self, user_id: &str, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM notes WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(n > 0)
        })
    }
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<NoteRow> {
    Ok(NoteRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        video_id: row.get(2)?,
        youtube_id: row.get(3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        video_title: row.get(6)?,
        thumbnail: row.get(7)?,
        timestamp: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VideoRow;
    use crate::queries::fixtures;
    use uuid::Uuid;

    fn note(user_id: &str, video: &VideoRow, content: &str, timestamp: f64) -> NoteRow {
        let now = now_timestamp();
        NoteRow {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            video_id: video.id.clone(),
            youtube_id: video.youtube_id.clone(),
            title: "Title".into(),
            content: content.into(),
            video_title: "A video".into(),
            thumbnail: Some("https://i.ytimg.com/vi/x/hqdefault.jpg".into()),
            timestamp,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn insert_persists_all_fields() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let video = fixtures::video(&db, &alice.id, "dQw4w9WgXcQ");
        let row = note(&alice.id, &video, "the chorus", 43.5);
        db.insert_note(&row).unwrap();

        let stored = db.get_note(&alice.id, &row.id).unwrap().unwrap();
        assert_eq!(stored.video_id, video.id);
        assert_eq!(stored.youtube_id, "dQw4w9WgXcQ");
        assert_eq!(stored.title, "Title");
        assert_eq!(stored.content, "the chorus");
        assert_eq!(stored.video_title, "A video");
        assert_eq!(stored.thumbnail, row.thumbnail);
        assert_eq!(stored.timestamp, 43.5);
        assert_eq!(stored.created_at, row.created_at);
    }

    #[test]
    fn update_touches_only_supplied_fields() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let video = fixtures::video(&db, &alice.id, "dQw4w9WgXcQ");
        let row = note(&alice.id, &video, "before", 10.0);
        db.insert_note(&row).unwrap();

        let changes = NoteChanges {
            content: Some("after".into()),
            ..Default::default()
        };
        let updated = db.update_note(&alice.id, &row.id, &changes).unwrap().unwrap();
        assert_eq!(updated.content, "after");
        assert_eq!(updated.title, "Title");
        assert_eq!(updated.timestamp, 10.0);
        assert!(updated.updated_at >= row.updated_at);
    }

    #[test]
    fn foreign_notes_are_invisible() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let bob = fixtures::user(&db, "bob");
        let video = fixtures::video(&db, &alice.id, "dQw4w9WgXcQ");
        let row = note(&alice.id, &video, "mine", 1.0);
        db.insert_note(&row).unwrap();

        assert!(db.get_note(&bob.id, &row.id).unwrap().is_none());
        assert!(db.update_note(&bob.id, &row.id, &NoteChanges::default()).unwrap().is_none());
        assert!(!db.delete_note(&bob.id, &row.id).unwrap());
        assert!(db.list_notes(&bob.id, &NoteFilter::All).unwrap().is_empty());
    }

    #[test]
    fn filtered_list_is_in_playback_order() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let first = fixtures::video(&db, &alice.id, "dQw4w9WgXcQ");
        let second = fixtures::video(&db, &alice.id, "9bZkp7q19f0");
        for (content, ts) in [("late", 90.0), ("early", 5.0), ("middle", 30.0)] {
            db.insert_note(&note(&alice.id, &first, content, ts)).unwrap();
        }
        db.insert_note(&note(&alice.id, &second, "other", 1.0)).unwrap();

        let by_video = db.list_notes(&alice.id, &NoteFilter::Video(first.id.clone())).unwrap();
        let contents: Vec<_> = by_video.iter().map(|n| n.content.as_str()).collect();
        assert_eq!(contents, ["early", "middle", "late"]);

        let by_youtube = db
            .list_notes(&alice.id, &NoteFilter::YoutubeId("9bZkp7q19f0".into()))
            .unwrap();
        assert_eq!(by_youtube.len(), 1);
        assert_eq!(db.list_notes(&alice.id, &NoteFilter::All).unwrap().len(), 4);
    }

    #[test]
    fn deleting_video_cascades_to_notes() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let video = fixtures::video(&db, &alice.id, "dQw4w9WgXcQ");
        let row = note(&alice.id, &video, "gone soon", 1.0);
        db.insert_note(&row).unwrap();

        assert!(db.delete_video(&alice.id, &video.id).unwrap());
        assert!(db.get_note(&alice.id, &row.id).unwrap().is_none());
    }

    #[test]
    fn deleting_user_cascades_everything() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        let video = fixtures::video(&db, &alice.id, "dQw4w9WgXcQ");
        db.insert_note(&note(&alice.id, &video, "x", 1.0)).unwrap();
        db.insert_refresh_token("jti", &alice.id, "h", 2_000_000_000).unwrap();

        assert!(db.delete_user(&alice.id).unwrap());
        assert!(db.list_videos(&alice.id).unwrap().is_empty());
        assert!(db.list_notes(&alice.id, &NoteFilter::All).unwrap().is_empty());
        assert!(db.get_refresh_token("jti").unwrap().is_none());
    }
}

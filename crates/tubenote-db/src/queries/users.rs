use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::Database;
use crate::models::{UserRow, now_timestamp};

const USER_COLUMNS: &str =
    "id, username, email, password, profile_picture, is_email_verified, created_at, updated_at";

/// Partial profile update. `profile_picture: Some(None)` clears the picture.
#[derive(Debug, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<Option<String>>,
}

impl Database {
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<UserRow> {
        self.with_conn(|conn| {
            let now = now_timestamp();
            conn.execute(
                "INSERT INTO users (id, username, email, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, username, email, password_hash, now],
            )?;
            query_user(conn, "id", id)?.ok_or_else(|| anyhow!("User vanished after insert: {}", id))
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    /// Login accepts either identifier.
    pub fn get_user_by_login(&self, identifier: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| match query_user(conn, "email", identifier)? {
            Some(user) => Ok(Some(user)),
            None => query_user(conn, "username", identifier),
        })
    }

    /// Returns the updated row, or `None` if the user does not exist.
    /// Changing the email clears the verified flag.
    pub fn update_profile(&self, id: &str, changes: &ProfileChanges) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(current) = query_user(&tx, "id", id)? else {
                return Ok(None);
            };

            let username = changes.username.as_deref().unwrap_or(&current.username);
            let email = changes.email.as_deref().unwrap_or(&current.email);
            let profile_picture = match &changes.profile_picture {
                Some(picture) => picture.clone(),
                None => current.profile_picture.clone(),
            };
            let verified = current.is_email_verified && email == current.email;

            tx.execute(
                "UPDATE users
                 SET username = ?1, email = ?2, profile_picture = ?3, is_email_verified = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![username, email, profile_picture, verified, now_timestamp(), id],
            )?;
            let updated = query_user(&tx, "id", id)?;
            tx.commit()?;
            Ok(updated)
        })
    }

    pub fn update_password(&self, id: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET password = ?1, updated_at = ?2 WHERE id = ?3",
                params![password_hash, now_timestamp(), id],
            )?;
            Ok(n > 0)
        })
    }

    pub fn set_email_verified(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET is_email_verified = 1, updated_at = ?1 WHERE id = ?2",
                params![now_timestamp(), id],
            )?;
            Ok(n > 0)
        })
    }

    /// Deletes the user; videos, notes and tokens go with it (ON DELETE CASCADE).
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is always one of our own literals, never user input.
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let row = conn.query_row(&sql, [value], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        profile_picture: row.get(4)?,
        is_email_verified: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    #[test]
    fn lookup_by_any_identifier() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");

        assert_eq!(db.get_user_by_login("alice").unwrap().unwrap().id, alice.id);
        assert_eq!(db.get_user_by_login("alice@example.com").unwrap().unwrap().id, alice.id);
        assert!(db.get_user_by_login("bob").unwrap().is_none());
        assert!(!alice.is_email_verified);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        fixtures::user(&db, "alice");
        let dup = db.create_user("other-id", "alice2", "alice@example.com", "x");
        assert!(dup.is_err());
    }

    #[test]
    fn profile_update_changes_only_supplied_fields() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        db.set_email_verified(&alice.id).unwrap();

        let updated = db
            .update_profile(
                &alice.id,
                &ProfileChanges {
                    profile_picture: Some(Some("https://img.example.com/a.png".into())),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.username, "alice");
        assert_eq!(updated.email, "alice@example.com");
        assert!(updated.is_email_verified);
        assert_eq!(updated.profile_picture.as_deref(), Some("https://img.example.com/a.png"));
    }

    #[test]
    fn email_change_clears_verification() {
        let db = Database::open_in_memory().unwrap();
        let alice = fixtures::user(&db, "alice");
        db.set_email_verified(&alice.id).unwrap();

        let updated = db
            .update_profile(
                &alice.id,
                &ProfileChanges {
                    email: Some("new@example.com".into()),
                    profile_picture: Some(None),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.email, "new@example.com");
        assert!(!updated.is_email_verified);
        assert!(updated.profile_picture.is_none());
    }

    #[test]
    fn update_missing_user_returns_none() {
        let db = Database::open_in_memory().unwrap();
        let result = db.update_profile("nope", &ProfileChanges::default()).unwrap();
        assert!(result.is_none());
    }
}

use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use crate::Database;
use crate::models::{EmailTokenKind, RefreshTokenRow, now_timestamp};

impl Database {
    // -- Refresh tokens --

    pub fn insert_refresh_token(
        &self,
        id: &str,
        user_id: &str,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, user_id, token_hash, expires_at, now_timestamp()],
            )?;
            Ok(())
        })
    }

    pub fn get_refresh_token(&self, id: &str) -> Result<Option<RefreshTokenRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_id, token_hash, expires_at, revoked, revoked_at
                     FROM refresh_tokens WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(RefreshTokenRow {
                            id: row.get(0)?,
                            user_id: row.get(1)?,
                            token_hash: row.get(2)?,
                            expires_at: row.get(3)?,
                            revoked: row.get(4)?,
                            revoked_at: row.get(5)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Returns true if the token was live and is now revoked. A second caller
    /// racing on the same token gets false, which is what makes rotation single-use.
    pub fn revoke_refresh_token(&self, id: &str, now: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE refresh_tokens SET revoked = 1, revoked_at = ?2 WHERE id = ?1 AND revoked = 0",
                params![id, now],
            )?;
            Ok(n > 0)
        })
    }

    /// Logout. A later replay of the token finds no row.
    pub fn delete_refresh_token(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM refresh_tokens WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    /// Ends every session of a user.
    pub fn delete_user_refresh_tokens(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM refresh_tokens WHERE user_id = ?1", [user_id])?;
            Ok(n)
        })
    }

    // -- Email tokens --

    /// Stores a new verification/reset token, retiring any earlier unused
    /// token of the same kind for this user.
    pub fn replace_email_token(
        &self,
        id: &str,
        user_id: &str,
        kind: EmailTokenKind,
        token_hash: &str,
        expires_at: i64,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE email_tokens SET used = 1 WHERE user_id = ?1 AND kind = ?2 AND used = 0",
                params![user_id, kind.as_str()],
            )?;
            tx.execute(
                "INSERT INTO email_tokens (id, user_id, kind, token_hash, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, user_id, kind.as_str(), token_hash, expires_at, now_timestamp()],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Marks a live token used and returns its owner. Unknown, expired and
    /// already-used tokens all yield `None`.
    pub fn consume_email_token(
        &self,
        kind: EmailTokenKind,
        token_hash: &str,
        now: i64,
    ) -> Result<Option<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let found: Option<(String, String)> = tx
                .query_row(
                    "SELECT id, user_id FROM email_tokens
                     WHERE token_hash = ?1 AND kind = ?2 AND used = 0 AND expires_at > ?3",
                    params![token_hash, kind.as_str(), now],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((id, user_id)) = found else {
                return Ok(None);
            };
            tx.execute("UPDATE email_tokens SET used = 1 WHERE id = ?1", [&id])?;
            tx.commit()?;
            Ok(Some(user_id))
        })
    }

    /// Drops expired refresh tokens and spent or expired email tokens.
    pub fn prune_expired_tokens(&self, now: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let refresh = conn.execute("DELETE FROM refresh_tokens WHERE expires_at < ?1", [now])?;
            let email = conn.execute(
                "DELETE FROM email_tokens WHERE expires_at < ?1 OR used = 1",
                [now],
            )?;
            Ok(refresh + email)
        })
    }
}

//! Connection and OAuth-state operations.

use super::Db;
use crate::error::AppError;
use crate::models::{OAuthState, WhoopConnection};
use chrono::{DateTime, Utc};

impl Db {
    // ─── Connection Operations ───────────────────────────────────

    /// Get a user's connection, active or not.
    pub async fn get_connection(&self, user_id: i64) -> Result<Option<WhoopConnection>, AppError> {
        let conn = sqlx::query_as::<_, WhoopConnection>(
            "SELECT * FROM whoop_connections WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(conn)
    }

    /// Resolve a WHOOP user ID to its active connection, if any.
    pub async fn get_active_connection_by_whoop_user(
        &self,
        whoop_user_id: i64,
    ) -> Result<Option<WhoopConnection>, AppError> {
        let conn = sqlx::query_as::<_, WhoopConnection>(
            "SELECT * FROM whoop_connections WHERE whoop_user_id = ? AND is_active = 1",
        )
        .bind(whoop_user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(conn)
    }

    /// Create or replace a user's connection (OAuth callback path).
    pub async fn upsert_connection(&self, conn: &WhoopConnection) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO whoop_connections
                (user_id, whoop_user_id, access_token_encrypted, refresh_token_encrypted,
                 token_expires_at, scopes, auto_create_sessions, auto_fill_readiness,
                 last_synced_at, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                whoop_user_id = excluded.whoop_user_id,
                access_token_encrypted = excluded.access_token_encrypted,
                refresh_token_encrypted = excluded.refresh_token_encrypted,
                token_expires_at = excluded.token_expires_at,
                scopes = excluded.scopes,
                is_active = excluded.is_active
            "#,
        )
        .bind(conn.user_id)
        .bind(conn.whoop_user_id)
        .bind(&conn.access_token_encrypted)
        .bind(&conn.refresh_token_encrypted)
        .bind(conn.token_expires_at)
        .bind(&conn.scopes)
        .bind(conn.auto_create_sessions)
        .bind(conn.auto_fill_readiness)
        .bind(conn.last_synced_at)
        .bind(conn.is_active)
        .bind(conn.created_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Store a freshly refreshed token pair.
    pub async fn update_connection_tokens(
        &self,
        user_id: i64,
        access_token_encrypted: &str,
        refresh_token_encrypted: &str,
        token_expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE whoop_connections
            SET access_token_encrypted = ?, refresh_token_encrypted = ?, token_expires_at = ?
            WHERE user_id = ?
            "#,
        )
        .bind(access_token_encrypted)
        .bind(refresh_token_encrypted)
        .bind(token_expires_at)
        .bind(user_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Update the per-user integration flags. Returns false when the user
    /// has no connection.
    pub async fn update_connection_settings(
        &self,
        user_id: i64,
        auto_create_sessions: bool,
        auto_fill_readiness: bool,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE whoop_connections
            SET auto_create_sessions = ?, auto_fill_readiness = ?
            WHERE user_id = ?
            "#,
        )
        .bind(auto_create_sessions)
        .bind(auto_fill_readiness)
        .bind(user_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a successful sync.
    pub async fn touch_last_synced(
        &self,
        user_id: i64,
        when: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE whoop_connections SET last_synced_at = ? WHERE user_id = ?")
            .bind(when)
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Delete a user's connection. Returns true if a row existed.
    pub async fn delete_connection(&self, user_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM whoop_connections WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── OAuth State Operations ──────────────────────────────────

    /// Persist a new CSRF state token.
    pub async fn create_oauth_state(&self, state: &OAuthState) -> Result<(), AppError> {
        sqlx::query("INSERT INTO oauth_states (state, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(&state.state)
            .bind(state.user_id)
            .bind(state.expires_at)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Consume a state token: the row is deleted on first read regardless
    /// of whether it turns out to be expired.
    pub async fn consume_oauth_state(&self, state: &str) -> Result<Option<OAuthState>, AppError> {
        let row = sqlx::query_as::<_, OAuthState>(
            "DELETE FROM oauth_states WHERE state = ? RETURNING state, user_id, expires_at",
        )
        .bind(state)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Drop expired state rows (housekeeping; consumption already handles
    /// the single-use guarantee).
    pub async fn prune_expired_oauth_states(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE expires_at < ?")
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}

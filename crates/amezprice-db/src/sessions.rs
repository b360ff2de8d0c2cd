//! Database operations for the `sessions` table.
//!
//! Only the SHA-256 hash of a session token is stored; the raw token lives in
//! the client cookie.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

#[derive(Debug, Clone)]
pub struct NewSession<'a> {
    pub user_id: i64,
    pub token_hash: &'a str,
    pub csrf_token: &'a str,
    pub ip_address: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub expires_at: DateTime<Utc>,
}

/// An unexpired session joined with its (active) user.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionWithUser {
    pub session_id: i64,
    pub csrf_token: String,
    pub rotated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub user_id: i64,
    pub user_public_id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

/// Inserts a session and returns its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_session(pool: &PgPool, session: &NewSession<'_>) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO sessions \
             (user_id, token_hash, csrf_token, ip_address, user_agent, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id",
    )
    .bind(session.user_id)
    .bind(session.token_hash)
    .bind(session.csrf_token)
    .bind(session.ip_address)
    .bind(session.user_agent)
    .bind(session.expires_at)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Loads the session for `token_hash`.
///
/// Expired sessions and sessions of deactivated users are treated as absent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_active_session(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<SessionWithUser>, DbError> {
    let row = sqlx::query_as::<_, SessionWithUser>(
        "SELECT s.id AS session_id, s.csrf_token, s.rotated_at, s.expires_at, \
                u.id AS user_id, u.public_id AS user_public_id, u.username, u.email, \
                u.first_name, u.last_name, u.role \
         FROM sessions s \
         JOIN users u ON u.id = s.user_id \
         WHERE s.token_hash = $1 \
           AND s.expires_at > NOW() \
           AND u.is_active = TRUE",
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Replaces the session's token hash and extends its expiry. The CSRF token
/// is kept so open pages keep working.
///
/// The swap only happens while the session still holds `current_token_hash`.
/// Returns `false` when another request rotated it first; the caller then
/// keeps the winner's token and must not hand out its own.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn rotate_session_token(
    pool: &PgPool,
    session_id: i64,
    current_token_hash: &str,
    new_token_hash: &str,
    expires_at: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE sessions \
         SET token_hash = $3, rotated_at = NOW(), last_seen_at = NOW(), expires_at = $4 \
         WHERE id = $1 AND token_hash = $2",
    )
    .bind(session_id)
    .bind(current_token_hash)
    .bind(new_token_hash)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Stamps `last_seen_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn touch_session(pool: &PgPool, session_id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE sessions SET last_seen_at = NOW() WHERE id = $1")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Deletes a session by id. Returns whether a row was removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_session(pool: &PgPool, session_id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes every session belonging to a user. Returns the number removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_user_sessions(pool: &PgPool, user_id: i64) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Deletes all expired sessions. Returns the number removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn purge_expired_sessions(pool: &PgPool) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

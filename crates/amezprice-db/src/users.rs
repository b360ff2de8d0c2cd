//! Database operations for the `users` table.

use amezprice_core::Role;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::DbError;

/// A row from the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub public_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    /// Argon2id PHC string. Never leaves the server.
    pub password_hash: String,
    /// `'user'` or `'admin'`; enforced by a CHECK constraint.
    pub role: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    /// Parsed role.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] if the stored role is unknown.
    pub fn role(&self) -> Result<Role, DbError> {
        Ok(self.role.parse::<Role>()?)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin.as_str()
    }
}

/// Fields for a new account. The caller validates and hashes beforehand.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
    pub password_hash: &'a str,
    pub role: Role,
}

/// Filters for the admin user listing.
#[derive(Debug, Clone, Default)]
pub struct UserListFilters<'a> {
    /// Case-insensitive substring match on username, email, or full name.
    pub search: Option<&'a str>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

/// Admin-editable fields. `None` leaves the column untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserAdminUpdate {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Inserts a user and returns the created row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails. A duplicate username or
/// email surfaces as a unique violation (see [`DbError::is_unique_violation`]).
pub async fn create_user(pool: &PgPool, user: &NewUser<'_>) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users \
             (public_id, first_name, last_name, username, email, phone, password_hash, role) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id, public_id, first_name, last_name, username, email, phone, \
                   password_hash, role, is_active, last_login_at, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(user.first_name)
    .bind(user.last_name)
    .bind(user.username)
    .bind(user.email)
    .bind(user.phone)
    .bind(user.password_hash)
    .bind(user.role.as_str())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetches a user by internal id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no such user exists, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_user_by_id(pool: &PgPool, id: i64) -> Result<UserRow, DbError> {
    sqlx::query_as::<_, UserRow>(
        "SELECT id, public_id, first_name, last_name, username, email, phone, \
                password_hash, role, is_active, last_login_at, created_at, updated_at \
         FROM users \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Looks a user up by username or email, case-insensitively.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_user_by_login(pool: &PgPool, login: &str) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, public_id, first_name, last_name, username, email, phone, \
                password_hash, role, is_active, last_login_at, created_at, updated_at \
         FROM users \
         WHERE LOWER(username) = LOWER($1) OR LOWER(email) = LOWER($1) \
         LIMIT 1",
    )
    .bind(login.trim())
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns a page of users, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_users(
    pool: &PgPool,
    filters: &UserListFilters<'_>,
) -> Result<Vec<UserRow>, DbError> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT id, public_id, first_name, last_name, username, email, phone, \
                password_hash, role, is_active, last_login_at, created_at, updated_at \
         FROM users \
         WHERE ($1::TEXT IS NULL \
                OR username ILIKE '%' || $1 || '%' \
                OR email ILIKE '%' || $1 || '%' \
                OR (first_name || ' ' || last_name) ILIKE '%' || $1 || '%') \
           AND ($2::TEXT IS NULL OR role = $2) \
           AND ($3::BOOLEAN IS NULL OR is_active = $3) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $4 OFFSET $5",
    )
    .bind(filters.search)
    .bind(filters.role.map(Role::as_str))
    .bind(filters.is_active)
    .bind(filters.limit)
    .bind(filters.offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Counts users matching the same filters as [`list_users`], ignoring paging.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_users(pool: &PgPool, filters: &UserListFilters<'_>) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) \
         FROM users \
         WHERE ($1::TEXT IS NULL \
                OR username ILIKE '%' || $1 || '%' \
                OR email ILIKE '%' || $1 || '%' \
                OR (first_name || ' ' || last_name) ILIKE '%' || $1 || '%') \
           AND ($2::TEXT IS NULL OR role = $2) \
           AND ($3::BOOLEAN IS NULL OR is_active = $3)",
    )
    .bind(filters.search)
    .bind(filters.role.map(Role::as_str))
    .bind(filters.is_active)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Locks every active admin row (in id order, so concurrent callers queue
/// instead of deadlocking) and then the target row. Returns the target and
/// the number of active admins.
///
/// A concurrent caller that removed an admin first has committed by the
/// time the lock is granted, so the count reflects that removal.
async fn lock_for_admin_change(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
) -> Result<(UserRow, usize), DbError> {
    let admins = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM users WHERE role = 'admin' AND is_active = TRUE ORDER BY id FOR UPDATE",
    )
    .fetch_all(&mut **tx)
    .await?;

    let target = sqlx::query_as::<_, UserRow>(
        "SELECT id, public_id, first_name, last_name, username, email, phone, \
                password_hash, role, is_active, last_login_at, created_at, updated_at \
         FROM users \
         WHERE id = $1 \
         FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok((target, admins.len()))
}

fn update_removes_admin(target: &UserRow, update: UserAdminUpdate) -> bool {
    target.is_admin()
        && target.is_active
        && (update.role == Some(Role::User) || update.is_active == Some(false))
}

/// Applies an admin edit and returns the updated row. Demoting or
/// deactivating the last active admin is refused.
///
/// # Errors
///
/// - [`DbError::NotFound`] if the user does not exist.
/// - [`DbError::LastActiveAdmin`] if the edit would leave no active admin.
/// - [`DbError::Sqlx`] if a query fails.
pub async fn update_user_admin_fields(
    pool: &PgPool,
    id: i64,
    update: UserAdminUpdate,
) -> Result<UserRow, DbError> {
    let mut tx = pool.begin().await?;
    let (target, active_admins) = lock_for_admin_change(&mut tx, id).await?;
    if update_removes_admin(&target, update) && active_admins <= 1 {
        return Err(DbError::LastActiveAdmin);
    }

    let row = sqlx::query_as::<_, UserRow>(
        "UPDATE users \
         SET role       = COALESCE($2, role), \
             is_active  = COALESCE($3, is_active), \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING id, public_id, first_name, last_name, username, email, phone, \
                   password_hash, role, is_active, last_login_at, created_at, updated_at",
    )
    .bind(id)
    .bind(update.role.map(Role::as_str))
    .bind(update.is_active)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

/// Deletes a user. Sessions, tracking rows, and push subscriptions cascade.
/// Deleting the last active admin is refused.
///
/// # Errors
///
/// - [`DbError::NotFound`] if the user does not exist.
/// - [`DbError::LastActiveAdmin`] if the user is the only active admin.
/// - [`DbError::Sqlx`] if a query fails.
pub async fn delete_user(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;
    let (target, active_admins) = lock_for_admin_change(&mut tx, id).await?;
    if target.is_admin() && target.is_active && active_admins <= 1 {
        return Err(DbError::LastActiveAdmin);
    }

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Number of active admin accounts.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_admins(pool: &PgPool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE role = 'admin' AND is_active = TRUE",
    )
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Stamps `last_login_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn touch_last_login(pool: &PgPool, id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

//! `admin` subcommands.

use amezprice_core::users::{normalize_email, validate_email, validate_password, validate_username};
use amezprice_core::{hash_password, Role};
use amezprice_db::{LogLevel, NewUser};
use amezprice_tracker::record_activity;
use clap::Subcommand;
use serde_json::json;
use sqlx::PgPool;

#[derive(Debug, Subcommand)]
pub enum AdminCommands {
    /// Create an admin account
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Falls back to `AMEZPRICE_ADMIN_PASSWORD` so it stays out of shell history
        #[arg(long, env = "AMEZPRICE_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "Admin")]
        first_name: String,
    },
}

pub(crate) async fn run(pool: &PgPool, command: AdminCommands) -> anyhow::Result<()> {
    match command {
        AdminCommands::Create {
            username,
            email,
            password,
            first_name,
        } => create_admin(pool, &username, &email, &password, &first_name).await,
    }
}

async fn create_admin(
    pool: &PgPool,
    username: &str,
    email: &str,
    password: &str,
    first_name: &str,
) -> anyhow::Result<()> {
    let username = username.trim();
    let email = normalize_email(email);
    validate_username(username)?;
    validate_email(&email)?;
    validate_password(password)?;

    let password_hash = hash_password(password)?;
    let user = amezprice_db::create_user(
        pool,
        &NewUser {
            first_name: first_name.trim(),
            last_name: "",
            username,
            email: &email,
            phone: None,
            password_hash: &password_hash,
            role: Role::Admin,
        },
    )
    .await
    .map_err(|e| {
        if e.is_unique_violation() {
            anyhow::anyhow!("username '{username}' or email '{email}' is already registered")
        } else {
            e.into()
        }
    })?;

    tracing::info!(user_id = user.id, username = %user.username, "admin account created");
    record_activity(
        pool,
        LogLevel::Info,
        "admin",
        &format!("admin {} created from the CLI", user.username),
        Some(user.id),
        json!({}),
    )
    .await;

    println!("created admin '{}' (id {})", user.username, user.id);
    Ok(())
}

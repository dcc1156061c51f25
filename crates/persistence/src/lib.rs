#![deny(warnings)]

//! Persistence layer: SQLite schema and owner-gated storage for users,
//! domains and their children.

use realm_core::ValidationError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

mod domains;
mod tokens;
mod users;

pub use domains::{
    add_enterprise, add_hero, add_troop, create_domain, delete_domain, delete_enterprise,
    delete_hero, delete_troop, list_domains, load_domain, update_domain, DomainInput,
    DomainSummary, EnterpriseInput, HeroInput, TroopInput,
};
pub use tokens::{consume_token, issue_token, TokenPurpose};
pub use users::{
    create_user, ensure_admin, get_user, mark_email_verified, principal_for, set_role,
};

/// Errors produced by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row does not exist or the caller may not see it.
    #[error("not found")]
    NotFound,
    /// Caller lacks the role for this operation.
    #[error("forbidden")]
    Forbidden,
    /// Email address already registered.
    #[error("email already registered: {0}")]
    DuplicateEmail(String),
    /// Token unknown, expired, already used or issued for another purpose.
    #[error("invalid or expired token")]
    InvalidToken,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL DEFAULT 'player',
        email_verified INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS domains (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        notes TEXT,
        income INTEGER,
        income_lower_limit INTEGER,
        income_upper_limit INTEGER,
        upkeep_cost INTEGER,
        upkeep_lower_limit INTEGER,
        upkeep_upper_limit INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_domains_owner ON domains(owner_id)",
    r#"CREATE TABLE IF NOT EXISTS enterprises (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        domain_id INTEGER NOT NULL REFERENCES domains(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        income INTEGER,
        income_lower_limit INTEGER,
        income_upper_limit INTEGER,
        upkeep_cost INTEGER,
        upkeep_lower_limit INTEGER,
        upkeep_upper_limit INTEGER
    )"#,
    r#"CREATE TABLE IF NOT EXISTS heroes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        domain_id INTEGER NOT NULL REFERENCES domains(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        wage INTEGER NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS troops (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        domain_id INTEGER NOT NULL REFERENCES domains(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        quantity INTEGER NOT NULL DEFAULT 0,
        wage INTEGER NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS user_tokens (
        token TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        purpose TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        consumed_at TEXT
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_enterprises_domain ON enterprises(domain_id)",
    "CREATE INDEX IF NOT EXISTS idx_heroes_domain ON heroes(domain_id)",
    "CREATE INDEX IF NOT EXISTS idx_troops_domain ON troops(domain_id)",
];

/// Returns the default SQLite URL used for local data.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./data/realm.db"
}

/// Create the parent directory of a file-backed SQLite URL.
pub fn ensure_parent_dir(url: &str) -> std::io::Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"));
    if let Some(path) = path.filter(|p| !p.starts_with(":memory:")) {
        let path = path.split('?').next().unwrap_or(path);
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}

/// Open (creating if needed) the database at `url` and apply the schema.
pub async fn init_db(url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let in_memory = url.contains(":memory:");
    // Every connection to an in-memory database sees its own database.
    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?
    };
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(&pool).await?;
    }
    info!(url, "database ready");
    Ok(pool)
}

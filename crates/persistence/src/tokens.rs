//! Single-use tokens for email verification and password reset.
//!
//! Tokens are only issued and consumed here; delivering them is someone
//! else's job.

use crate::users::mark_email_verified;
use crate::StoreError;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use realm_core::UserId;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::fmt::Write;
use tracing::{info, warn};

/// What a token may be used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenPurpose {
    EmailVerification,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::EmailVerification => "email_verification",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }

    /// Default validity window.
    pub fn default_ttl(&self) -> Duration {
        match self {
            TokenPurpose::EmailVerification => Duration::hours(48),
            TokenPurpose::PasswordReset => Duration::hours(1),
        }
    }
}

fn random_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    bytes.iter().fold(String::with_capacity(64), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Issue a fresh token, revoking any outstanding one of the same purpose.
pub async fn issue_token(
    pool: &SqlitePool,
    user: UserId,
    purpose: TokenPurpose,
    ttl: Duration,
) -> Result<String, StoreError> {
    let token = random_token();
    let expires_at = Utc::now() + ttl;
    let mut tx = pool.begin().await?;
    let exists = sqlx::query("SELECT 1 FROM users WHERE id = ?")
        .bind(user.0)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(StoreError::NotFound);
    }
    sqlx::query("DELETE FROM user_tokens WHERE user_id = ? AND purpose = ? AND consumed_at IS NULL")
        .bind(user.0)
        .bind(purpose.as_str())
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO user_tokens (token, user_id, purpose, expires_at) VALUES (?, ?, ?, ?)")
        .bind(&token)
        .bind(user.0)
        .bind(purpose.as_str())
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    info!(user_id = user.0, purpose = purpose.as_str(), "token issued");
    Ok(token)
}

/// Redeem a token, returning its user. Each token works once.
///
/// Redeeming an email-verification token also marks the address verified.
pub async fn consume_token(
    pool: &SqlitePool,
    token: &str,
    purpose: TokenPurpose,
) -> Result<UserId, StoreError> {
    let mut tx = pool.begin().await?;
    let row = sqlx::query(
        "SELECT user_id, expires_at, consumed_at FROM user_tokens WHERE token = ? AND purpose = ?",
    )
    .bind(token)
    .bind(purpose.as_str())
    .fetch_optional(&mut *tx)
    .await?;
    let Some(row) = row else {
        return Err(StoreError::InvalidToken);
    };
    let user = UserId(row.try_get("user_id")?);
    let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
    let consumed_at: Option<DateTime<Utc>> = row.try_get("consumed_at")?;
    let now = Utc::now();
    if consumed_at.is_some() || expires_at <= now {
        warn!(user_id = user.0, purpose = purpose.as_str(), "stale token presented");
        return Err(StoreError::InvalidToken);
    }
    let claimed = sqlx::query(
        "UPDATE user_tokens SET consumed_at = ? WHERE token = ? AND consumed_at IS NULL",
    )
    .bind(now)
    .bind(token)
    .execute(&mut *tx)
    .await?;
    if claimed.rows_affected() == 0 {
        return Err(StoreError::InvalidToken);
    }
    if purpose == TokenPurpose::EmailVerification {
        mark_email_verified(&mut *tx, user).await?;
    }
    tx.commit().await?;
    info!(user_id = user.0, purpose = purpose.as_str(), "token consumed");
    Ok(user)
}

use crate::StoreError;
use chrono::Utc;
use realm_core::{normalize_email, Principal, Role, User, UserId};
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{Executor, Row};
use tracing::info;

fn user_from_row(row: &SqliteRow) -> Result<User, StoreError> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: UserId(row.try_get("id")?),
        email: row.try_get("email")?,
        role: role.parse()?,
        email_verified: row.try_get("email_verified")?,
    })
}

/// Register a new account.
pub async fn create_user(pool: &SqlitePool, email: &str, role: Role) -> Result<User, StoreError> {
    let email = normalize_email(email)?;
    let res = sqlx::query("INSERT INTO users (email, role, created_at) VALUES (?, ?, ?)")
        .bind(&email)
        .bind(role.as_str())
        .bind(Utc::now())
        .execute(pool)
        .await;
    let id = match res {
        Ok(done) => done.last_insert_rowid(),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(StoreError::DuplicateEmail(email));
        }
        Err(e) => return Err(e.into()),
    };
    info!(user_id = id, %role, "user created");
    Ok(User {
        id: UserId(id),
        email,
        role,
        email_verified: false,
    })
}

pub async fn get_user(pool: &SqlitePool, id: UserId) -> Result<Option<User>, StoreError> {
    let row = sqlx::query("SELECT id, email, role, email_verified FROM users WHERE id = ?")
        .bind(id.0)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(user_from_row).transpose()
}

/// Resolve the principal acting as `id`.
pub async fn principal_for(pool: &SqlitePool, id: UserId) -> Result<Principal, StoreError> {
    let user = get_user(pool, id).await?.ok_or(StoreError::NotFound)?;
    Ok(Principal::new(user.id, user.role))
}

/// Change a user's role. Only admins may do this.
pub async fn set_role(
    pool: &SqlitePool,
    actor: &Principal,
    id: UserId,
    role: Role,
) -> Result<User, StoreError> {
    if !actor.can_manage_roles() {
        return Err(StoreError::Forbidden);
    }
    let done = sqlx::query("UPDATE users SET role = ? WHERE id = ?")
        .bind(role.as_str())
        .bind(id.0)
        .execute(pool)
        .await?;
    if done.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    info!(actor = actor.user_id.0, user_id = id.0, %role, "role changed");
    get_user(pool, id).await?.ok_or(StoreError::NotFound)
}

/// Set the verified flag. Runs on a pool or inside a caller's transaction.
pub async fn mark_email_verified<'e, E>(executor: E, id: UserId) -> Result<(), StoreError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let done = sqlx::query("UPDATE users SET email_verified = 1 WHERE id = ?")
        .bind(id.0)
        .execute(executor)
        .await?;
    if done.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Return the account registered under `email`, promoted to admin, creating
/// it when missing.
pub async fn ensure_admin(pool: &SqlitePool, email: &str) -> Result<User, StoreError> {
    let email = normalize_email(email)?;
    let row = sqlx::query("SELECT id, email, role, email_verified FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(pool)
        .await?;
    match row {
        Some(row) => {
            let user = user_from_row(&row)?;
            if user.role == Role::Admin {
                return Ok(user);
            }
            sqlx::query("UPDATE users SET role = ? WHERE id = ?")
                .bind(Role::Admin.as_str())
                .bind(user.id.0)
                .execute(pool)
                .await?;
            info!(user_id = user.id.0, "user promoted to admin");
            Ok(User {
                role: Role::Admin,
                ..user
            })
        }
        None => create_user(pool, &email, Role::Admin).await,
    }
}

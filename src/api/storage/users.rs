//! Account store.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::models::User;

use super::StorageError;

const USER_COLUMNS: &str = "id, email, password_hash, name, oidc_subject, oidc_issuer, \
     auth_provider, current_token, created_at, updated_at";

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub name: &'a str,
    pub auth_provider: &'a str,
    pub oidc_subject: Option<&'a str>,
    pub oidc_issuer: Option<&'a str>,
}

pub async fn create(conn: &mut SqliteConnection, new: NewUser<'_>) -> Result<User, StorageError> {
    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO users \
         (email, password_hash, name, oidc_subject, oidc_issuer, auth_provider, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new.email)
    .bind(new.password_hash)
    .bind(new.name)
    .bind(new.oidc_subject)
    .bind(new.oidc_issuer)
    .bind(new.auth_provider)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(User {
        id: result.last_insert_rowid(),
        email: new.email.to_string(),
        password_hash: new.password_hash.to_string(),
        name: new.name.to_string(),
        oidc_subject: new.oidc_subject.map(str::to_string),
        oidc_issuer: new.oidc_issuer.map(str::to_string),
        auth_provider: new.auth_provider.to_string(),
        current_token: None,
        created_at: now,
        updated_at: now,
    })
}

pub async fn find_by_id(
    conn: &mut SqliteConnection,
    id: i64,
) -> Result<Option<User>, StorageError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(user)
}

pub async fn find_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> Result<Option<User>, StorageError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(user)
}

pub async fn find_by_oidc_subject(
    conn: &mut SqliteConnection,
    subject: &str,
) -> Result<Option<User>, StorageError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE oidc_subject = ?");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(subject)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(user)
}

/// Bind an external identity onto an existing account.
pub async fn link_oidc(
    conn: &mut SqliteConnection,
    user_id: i64,
    issuer: &str,
    subject: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE users SET oidc_subject = ?, oidc_issuer = ?, auth_provider = 'oidc', \
         updated_at = ? WHERE id = ?",
    )
    .bind(subject)
    .bind(issuer)
    .bind(Utc::now())
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Store the account's sole live session token, superseding any previous one.
pub async fn set_current_token(
    conn: &mut SqliteConnection,
    user_id: i64,
    token: &str,
) -> Result<(), StorageError> {
    sqlx::query("UPDATE users SET current_token = ?, updated_at = ? WHERE id = ?")
        .bind(token)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn clear_current_token(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<(), StorageError> {
    sqlx::query("UPDATE users SET current_token = NULL, updated_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn update_profile(
    conn: &mut SqliteConnection,
    user_id: i64,
    name: &str,
) -> Result<(), StorageError> {
    sqlx::query("UPDATE users SET name = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn update_password(
    conn: &mut SqliteConnection,
    user_id: i64,
    password_hash: &str,
) -> Result<(), StorageError> {
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

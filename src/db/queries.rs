use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::user::User;

/// A user row including the password hash, for credential checks only.
pub struct UserWithPassword {
    pub user: User,
    pub password_hash: String,
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert a new user account
pub async fn create_user(
    pool: &PgPool,
    username: &str,
    password_hash: &str,
    email: Option<&str>,
) -> Result<User, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO users (username, password_hash, email)
        VALUES ($1, $2, $3)
        RETURNING id, username, email, created_at
        "#,
    )
    .bind(username)
    .bind(password_hash)
    .bind(email)
    .fetch_one(pool)
    .await?;

    user_from_row(&row)
}

/// Look up a user with the stored password hash for login
pub async fn find_user_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<UserWithPassword>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, username, password_hash, email, created_at
        FROM users
        WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(match row {
        Some(row) => Some(UserWithPassword {
            user: user_from_row(&row)?,
            password_hash: row.try_get("password_hash")?,
        }),
        None => None,
    })
}

/// Check whether a username is already taken
pub async fn username_exists(pool: &PgPool, username: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT 1 AS present FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Get a user by ID
pub async fn get_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, username, email, created_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| user_from_row(&row)).transpose()
}

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use super::types::*;
use crate::store::StoreError;

#[derive(sqlx::FromRow)]
struct Row {
    id: String,
    user_id: String,
    title: String,
    body: String,
    icon: String,
    data: Json<NotificationData>,
    is_read: bool,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<Row> for Notification {
    fn from(row: Row) -> Self {
        Notification {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            body: row.body,
            icon: row.icon,
            data: row.data.0,
            read: row.is_read,
            deleted: row.is_deleted,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}

pub async fn insert(pool: &PgPool, n: &Notification) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO notifications \
             (id, user_id, title, body, icon, data, is_read, is_deleted, created_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
    )
    .bind(&n.id)
    .bind(&n.user_id)
    .bind(&n.title)
    .bind(&n.body)
    .bind(&n.icon)
    .bind(Json(&n.data))
    .bind(n.read)
    .bind(n.deleted)
    .bind(n.created_at)
    .bind(n.expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Visible notifications of one user, newest first.
pub async fn find_visible_for_user(
    pool: &PgPool,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Notification>, StoreError> {
    let rows = sqlx::query_as::<_, Row>(
        "SELECT id, user_id, title, body, icon, data, is_read, is_deleted, created_at, expires_at \
         FROM notifications \
         WHERE user_id = $1 AND NOT is_deleted AND expires_at > $2 \
         ORDER BY created_at DESC",
    )
    .bind(user_id)
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(Notification::from).collect())
}

pub async fn update_flags(
    pool: &PgPool,
    user_id: &str,
    id: &str,
    read: Option<bool>,
    deleted: Option<bool>,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE notifications \
         SET is_read = COALESCE($3, is_read), is_deleted = COALESCE($4, is_deleted) \
         WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .bind(read)
    .bind(deleted)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn count_unread(pool: &PgPool, user_id: &str, now: DateTime<Utc>) -> Result<i64, StoreError> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM notifications \
         WHERE user_id = $1 AND NOT is_read AND NOT is_deleted AND expires_at > $2",
    )
    .bind(user_id)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use super::types::*;
use crate::models::notification::NoticeKind;
use crate::store::StoreError;

#[derive(sqlx::FromRow)]
struct Row {
    id: String,
    proposal_id: String,
    kind: String,
    revision: i64,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<Row> for OutboxEvent {
    type Error = StoreError;

    fn try_from(row: Row) -> Result<Self, Self::Error> {
        let kind = row.kind.parse::<NoticeKind>().map_err(|reason| StoreError::Corrupt {
            id: row.id.clone(),
            reason,
        })?;
        Ok(OutboxEvent {
            id: row.id,
            proposal_id: row.proposal_id,
            kind,
            revision: row.revision,
            created_at: row.created_at,
            processed_at: row.processed_at,
        })
    }
}

pub async fn insert(conn: &mut PgConnection, event: &OutboxEvent) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO proposal_events (id, proposal_id, kind, revision, created_at, processed_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&event.id)
    .bind(&event.proposal_id)
    .bind(event.kind.as_str())
    .bind(event.revision)
    .bind(event.created_at)
    .bind(event.processed_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find_unprocessed(pool: &PgPool, limit: usize) -> Result<Vec<OutboxEvent>, StoreError> {
    let rows = sqlx::query_as::<_, Row>(
        "SELECT id, proposal_id, kind, revision, created_at, processed_at \
         FROM proposal_events WHERE processed_at IS NULL \
         ORDER BY created_at LIMIT $1",
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(OutboxEvent::try_from).collect()
}

pub async fn mark_processed(pool: &PgPool, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
    sqlx::query("UPDATE proposal_events SET processed_at = $2 WHERE id = $1")
        .bind(id)
        .bind(at)
        .execute(pool)
        .await?;
    Ok(())
}

/// Insert-if-absent. Returns true when this call recorded the delivery.
pub async fn record_delivery(
    pool: &PgPool,
    scope: &str,
    recipient: &str,
    at: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "INSERT INTO notification_deliveries (scope, recipient, created_at) VALUES ($1, $2, $3) \
         ON CONFLICT (scope, recipient) DO NOTHING",
    )
    .bind(scope)
    .bind(recipient)
    .bind(at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn release_delivery(pool: &PgPool, scope: &str, recipient: &str) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM notification_deliveries WHERE scope = $1 AND recipient = $2")
        .bind(scope)
        .bind(recipient)
        .execute(pool)
        .await?;
    Ok(())
}

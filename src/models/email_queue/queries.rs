use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use super::types::*;
use crate::store::StoreError;

#[derive(sqlx::FromRow)]
struct Row {
    id: String,
    to_address: String,
    subject: String,
    html_content: String,
    status: String,
    error: Option<String>,
    retries: i32,
    sent_at: Option<DateTime<Utc>>,
    last_attempt_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    claimed_until: Option<DateTime<Utc>>,
}

impl TryFrom<Row> for EmailQueueEntry {
    type Error = StoreError;

    fn try_from(row: Row) -> Result<Self, Self::Error> {
        let status = row.status.parse::<EmailStatus>().map_err(|reason| StoreError::Corrupt {
            id: row.id.clone(),
            reason,
        })?;
        Ok(EmailQueueEntry {
            id: row.id,
            to: row.to_address,
            subject: row.subject,
            html_content: row.html_content,
            status,
            error: row.error,
            retries: row.retries,
            sent_at: row.sent_at,
            last_attempt_at: row.last_attempt_at,
            created_at: row.created_at,
            claimed_until: row.claimed_until,
        })
    }
}

pub async fn insert(pool: &PgPool, entry: &EmailQueueEntry) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO email_queue \
             (id, to_address, subject, html_content, status, error, retries, sent_at, last_attempt_at, created_at, claimed_until) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
    )
    .bind(&entry.id)
    .bind(&entry.to)
    .bind(&entry.subject)
    .bind(&entry.html_content)
    .bind(entry.status.as_str())
    .bind(&entry.error)
    .bind(entry.retries)
    .bind(entry.sent_at)
    .bind(entry.last_attempt_at)
    .bind(entry.created_at)
    .bind(entry.claimed_until)
    .execute(pool)
    .await?;
    Ok(())
}

/// Claim up to `limit` due entries, oldest first: pending entries plus failed
/// entries whose backoff has elapsed, skipping rows another drainer holds.
pub async fn claim_due(
    pool: &PgPool,
    policy: &RetryPolicy,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<EmailQueueEntry>, StoreError> {
    let rows = sqlx::query_as::<_, Row>(
        "WITH due AS ( \
             SELECT id FROM email_queue \
             WHERE (claimed_until IS NULL OR claimed_until <= $3) \
               AND (status = 'pending' \
                    OR (status = 'failed' \
                        AND retries < $1 \
                        AND COALESCE(last_attempt_at, created_at) \
                            + make_interval(secs => $2::float8 * power(2, LEAST(GREATEST(retries - 1, 0), $5))) <= $3)) \
             ORDER BY created_at \
             LIMIT $4 \
             FOR UPDATE SKIP LOCKED \
         ) \
         UPDATE email_queue e SET claimed_until = $6 \
         FROM due WHERE e.id = due.id \
         RETURNING e.id, e.to_address, e.subject, e.html_content, e.status, e.error, e.retries, \
                   e.sent_at, e.last_attempt_at, e.created_at, e.claimed_until",
    )
    .bind(policy.max_retries)
    .bind(policy.base_delay_secs as f64)
    .bind(now)
    .bind(limit as i64)
    .bind(MAX_BACKOFF_EXPONENT)
    .bind(now + Duration::seconds(CLAIM_LEASE_SECS))
    .fetch_all(pool)
    .await?;
    let mut entries = rows
        .into_iter()
        .map(EmailQueueEntry::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.created_at);
    Ok(entries)
}

pub async fn update_delivery(pool: &PgPool, entry: &EmailQueueEntry) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE email_queue \
         SET status = $2, error = $3, retries = $4, sent_at = $5, last_attempt_at = $6, claimed_until = $7 \
         WHERE id = $1",
    )
    .bind(&entry.id)
    .bind(entry.status.as_str())
    .bind(&entry.error)
    .bind(entry.retries)
    .bind(entry.sent_at)
    .bind(entry.last_attempt_at)
    .bind(entry.claimed_until)
    .execute(pool)
    .await?;
    Ok(())
}

use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use super::types::*;
use crate::store::StoreError;

#[derive(sqlx::FromRow)]
struct Row {
    id: String,
    doc: Json<Proposal>,
}

impl Row {
    fn into_proposal(self) -> Proposal {
        let mut proposal = self.doc.0;
        // The key column is authoritative over the copy inside the document.
        proposal.id = self.id;
        proposal
    }
}

/// Insert a new proposal document.
pub async fn insert(conn: &mut PgConnection, proposal: &Proposal) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO proposals (id, status, user_id, revision, status_revision, doc, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(&proposal.id)
    .bind(proposal.status.as_str())
    .bind(&proposal.user_id)
    .bind(proposal.revision)
    .bind(proposal.status_revision)
    .bind(Json(proposal))
    .bind(proposal.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Find a single proposal by id.
pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Proposal>, StoreError> {
    let row = sqlx::query_as::<_, Row>("SELECT id, doc FROM proposals WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Row::into_proposal))
}

/// Find all proposals, optionally filtered by status, newest first.
pub async fn find_all(pool: &PgPool, status: Option<ProposalStatus>) -> Result<Vec<Proposal>, StoreError> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, Row>(
                "SELECT id, doc FROM proposals WHERE status = $1 ORDER BY created_at DESC",
            )
            .bind(status.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Row>("SELECT id, doc FROM proposals ORDER BY created_at DESC")
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows.into_iter().map(Row::into_proposal).collect())
}

/// Replace a proposal document if the stored revision still matches.
/// Returns false when another writer got there first.
pub async fn update_if_revision(
    conn: &mut PgConnection,
    proposal: &Proposal,
    expected_revision: i64,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE proposals SET status = $2, user_id = $3, revision = $4, status_revision = $5, doc = $6 \
         WHERE id = $1 AND revision = $7",
    )
    .bind(&proposal.id)
    .bind(proposal.status.as_str())
    .bind(&proposal.user_id)
    .bind(proposal.revision)
    .bind(proposal.status_revision)
    .bind(Json(proposal))
    .bind(expected_revision)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Flip `notified` on and bump the revision, iff the status was last
/// changed by the write at `status_revision`.
pub async fn mark_notified(pool: &PgPool, id: &str, status_revision: i64) -> Result<bool, StoreError> {
    let result = sqlx::query(
        "UPDATE proposals \
         SET revision = revision + 1, \
             doc = jsonb_set(jsonb_set(doc, '{notified}', 'true'::jsonb), '{revision}', to_jsonb(revision + 1)) \
         WHERE id = $1 AND status_revision = $2",
    )
    .bind(id)
    .bind(status_revision)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

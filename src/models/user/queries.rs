use chrono::NaiveDate;
use sqlx::PgPool;

use super::types::*;
use crate::store::StoreError;

#[derive(sqlx::FromRow)]
struct Row {
    id: String,
    email: String,
    role: String,
    full_name: String,
    dob: Option<NaiveDate>,
    phone: String,
    verified: bool,
    disabled: bool,
}

impl TryFrom<Row> for User {
    type Error = StoreError;

    fn try_from(row: Row) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(|reason| StoreError::Corrupt {
            id: row.id.clone(),
            reason,
        })?;
        Ok(User {
            id: row.id,
            email: row.email,
            role,
            full_name: row.full_name,
            dob: row.dob,
            phone: row.phone,
            verified: row.verified,
            disabled: row.disabled,
        })
    }
}

const COLUMNS: &str = "id, email, role, full_name, dob, phone, verified, disabled";

pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<User>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
    let row = sqlx::query_as::<_, Row>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(User::try_from).transpose()
}

/// Enabled users holding any of the given roles.
pub async fn find_by_roles(pool: &PgPool, roles: &[Role]) -> Result<Vec<User>, StoreError> {
    let role_names: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();
    let sql = format!(
        "SELECT {COLUMNS} FROM users WHERE role = ANY($1) AND NOT disabled ORDER BY full_name, id"
    );
    let rows = sqlx::query_as::<_, Row>(&sql)
        .bind(&role_names)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(User::try_from).collect()
}

pub async fn upsert(pool: &PgPool, user: &User) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO users (id, email, role, full_name, dob, phone, verified, disabled) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (id) DO UPDATE SET \
             email = EXCLUDED.email, role = EXCLUDED.role, full_name = EXCLUDED.full_name, \
             dob = EXCLUDED.dob, phone = EXCLUDED.phone, verified = EXCLUDED.verified, \
             disabled = EXCLUDED.disabled",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(user.role.as_str())
    .bind(&user.full_name)
    .bind(user.dob)
    .bind(&user.phone)
    .bind(user.verified)
    .bind(user.disabled)
    .execute(pool)
    .await?;
    Ok(())
}

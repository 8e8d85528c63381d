use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use aviro_core::repository::{IdempotencyInsert, IdempotencyRepository};

pub struct PgIdempotencyRepository {
    pool: PgPool,
}

impl PgIdempotencyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyRepository for PgIdempotencyRepository {
    async fn find(
        &self,
        key: &str,
    ) -> Result<Option<Uuid>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query("SELECT booking_id FROM idempotency_keys WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.try_get("booking_id")).transpose()?)
    }

    async fn insert(
        &self,
        key: &str,
        booking_id: Uuid,
    ) -> Result<IdempotencyInsert, Box<dyn std::error::Error + Send + Sync>> {
        let result = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, booking_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(booking_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(IdempotencyInsert::Inserted);
        }
        // Someone else claimed the key first; report whose booking won.
        let winner = self
            .find(key)
            .await?
            .ok_or("idempotency key vanished between insert and read")?;
        Ok(IdempotencyInsert::Exists(winner))
    }
}

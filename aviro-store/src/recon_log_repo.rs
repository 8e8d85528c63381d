use async_trait::async_trait;
use sqlx::PgPool;

use aviro_core::model::reconcile::ReconciliationRun;
use aviro_core::repository::ReconciliationLogRepository;

pub struct PgReconciliationLogRepository {
    pool: PgPool,
}

impl PgReconciliationLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReconciliationLogRepository for PgReconciliationLogRepository {
    async fn insert_run(
        &self,
        run: &ReconciliationRun,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let entries = serde_json::to_value(&run.entries)?;
        sqlx::query(
            r#"
            INSERT INTO reconciliation_logs
                (id, started_at, finished_at, run_by, dry_run,
                 scanned, retried, expired, skipped, errors, entries)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(run.id)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(&run.run_by)
        .bind(run.dry_run)
        .bind(run.scanned as i32)
        .bind(run.retried as i32)
        .bind(run.expired as i32)
        .bind(run.skipped as i32)
        .bind(run.errors as i32)
        .bind(entries)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

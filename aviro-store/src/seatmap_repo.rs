use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};

use aviro_core::model::seatmap::SeatMap;
use aviro_core::repository::{SaveError, SeatMapStore};

pub struct PgSeatMapStore {
    pool: PgPool,
}

impl PgSeatMapStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Seed a brand-new map at version 0.
    pub async fn insert(&self, map: &SeatMap) -> Result<(), sqlx::Error> {
        let doc = serde_json::to_value(map).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query(
            r#"
            INSERT INTO seat_maps
                (id, flight_id, legacy_flight_id, aliases, version, updated_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(map.id)
        .bind(&map.flight_id)
        .bind(&map.legacy_flight_id)
        .bind(&map.aliases)
        .bind(map.version as i64)
        .bind(map.updated_at)
        .bind(doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SeatMapStore for PgSeatMapStore {
    async fn find_by_key(
        &self,
        key: &str,
    ) -> Result<Option<SeatMap>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query(
            r#"
            SELECT doc FROM seat_maps
            WHERE flight_id = $1 OR legacy_flight_id = $1 OR $1 = ANY(aliases)
            LIMIT 1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let doc: Value = row.try_get("doc")?;
                Ok(Some(serde_json::from_value(doc)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, map: &SeatMap, expected_version: u64) -> Result<(), SaveError> {
        let mut next = map.clone();
        next.version = expected_version + 1;
        let doc = serde_json::to_value(&next).map_err(|e| SaveError::Other(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE seat_maps
            SET doc = $2, version = $3, legacy_flight_id = $4, aliases = $5, updated_at = $6
            WHERE id = $1 AND version = $7
            "#,
        )
        .bind(next.id)
        .bind(doc)
        .bind(next.version as i64)
        .bind(&next.legacy_flight_id)
        .bind(&next.aliases)
        .bind(next.updated_at)
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| SaveError::Other(e.to_string()))?;

        // Zero rows means the version moved under us (or the map is gone);
        // either way the caller must reload.
        if result.rows_affected() == 0 {
            return Err(SaveError::Conflict);
        }
        Ok(())
    }
}

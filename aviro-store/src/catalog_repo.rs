use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use aviro_core::model::addon::Addon;
use aviro_core::model::coupon::Coupon;
use aviro_core::model::flight::Flight;
use aviro_core::repository::{AddonRepository, CouponRepository, FlightRepository};

pub struct PgCouponRepository {
    pool: PgPool,
}

impl PgCouponRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, coupon: &Coupon) -> Result<(), sqlx::Error> {
        let doc = serde_json::to_value(coupon).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query("INSERT INTO coupons (id, code, used_count, doc) VALUES ($1, $2, $3, $4)")
            .bind(coupon.id)
            .bind(&coupon.code)
            .bind(coupon.used_count)
            .bind(doc)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CouponRepository for PgCouponRepository {
    async fn find_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Coupon>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query("SELECT doc, used_count FROM coupons WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let doc: Value = row.try_get("doc")?;
                let mut coupon: Coupon = serde_json::from_value(doc)?;
                // The counter column is the live one; the document lags.
                coupon.used_count = row.try_get("used_count")?;
                Ok(Some(coupon))
            }
            None => Ok(None),
        }
    }

    async fn count_user_uses(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<i64, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS uses FROM coupon_redemptions WHERE code = $1 AND user_id = $2",
        )
        .bind(code)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("uses")?)
    }

    async fn increment_usage(
        &self,
        code: &str,
        user_id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE coupons SET used_count = used_count + 1 WHERE code = $1")
            .bind(code)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO coupon_redemptions (code, user_id, redeemed_at) VALUES ($1, $2, NOW())",
        )
        .bind(code)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}

pub struct PgAddonRepository {
    pool: PgPool,
}

impl PgAddonRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, addon: &Addon) -> Result<(), sqlx::Error> {
        let doc = serde_json::to_value(addon).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query("INSERT INTO addons (id, code, active, doc) VALUES ($1, $2, $3, $4)")
            .bind(addon.id)
            .bind(&addon.code)
            .bind(addon.active)
            .bind(doc)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AddonRepository for PgAddonRepository {
    async fn find_active_by_codes(
        &self,
        codes: &[String],
    ) -> Result<Vec<Addon>, Box<dyn std::error::Error + Send + Sync>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query("SELECT doc FROM addons WHERE code = ANY($1) AND active")
            .bind(codes)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let doc: Value = row.try_get("doc")?;
                Ok(serde_json::from_value(doc)?)
            })
            .collect()
    }
}

pub struct PgFlightRepository {
    pool: PgPool,
}

impl PgFlightRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, flight: &Flight) -> Result<(), sqlx::Error> {
        let doc = serde_json::to_value(flight).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query(
            r#"
            INSERT INTO flights (id, origin, destination, departure_at, doc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(flight.id)
        .bind(&flight.origin)
        .bind(&flight.destination)
        .bind(flight.departure_at)
        .bind(doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl FlightRepository for PgFlightRepository {
    async fn find_by_id(
        &self,
        id: &str,
    ) -> Result<Option<Flight>, Box<dyn std::error::Error + Send + Sync>> {
        // Flight keys from bookings may be provider references rather
        // than our UUIDs; those simply have no local row.
        let Ok(uuid) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        let row = sqlx::query("SELECT doc FROM flights WHERE id = $1")
            .bind(uuid)
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

    async fn search(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> Result<Vec<Flight>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query(
            r#"
            SELECT doc FROM flights
            WHERE origin = $1 AND destination = $2 AND departure_at::date = $3
            ORDER BY departure_at ASC
            "#,
        )
        .bind(origin)
        .bind(destination)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let doc: Value = row.try_get("doc")?;
                Ok(serde_json::from_value(doc)?)
            })
            .collect()
    }
}

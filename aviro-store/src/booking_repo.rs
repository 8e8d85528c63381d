use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use aviro_core::model::booking::Booking;
use aviro_core::repository::BookingRepository;

/// Bookings are stored as a JSONB document plus the columns the service
/// filters on, so lookups stay indexable while the aggregate stays whole.
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(row: &sqlx::postgres::PgRow) -> Result<Booking, Box<dyn std::error::Error + Send + Sync>> {
        let doc: Value = row.try_get("doc")?;
        Ok(serde_json::from_value(doc)?)
    }

    async fn fetch_one_where(
        &self,
        sql: &str,
        bind: &str,
    ) -> Result<Option<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query(sql).bind(bind).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::decode).transpose()
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert(
        &self,
        booking: &Booking,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let doc = serde_json::to_value(booking)?;
        sqlx::query(
            r#"
            INSERT INTO bookings
                (id, booking_ref, user_id, status, session_id, payment_intent_id,
                 created_at, updated_at, doc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.booking_ref)
        .bind(&booking.user_id)
        .bind(booking.status.as_str())
        .bind(&booking.payment.session_id)
        .bind(&booking.payment.payment_intent_id)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(
        &self,
        booking: &Booking,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let doc = serde_json::to_value(booking)?;
        sqlx::query(
            r#"
            UPDATE bookings
            SET status = $2, session_id = $3, payment_intent_id = $4,
                updated_at = $5, doc = $6
            WHERE id = $1
            "#,
        )
        .bind(booking.id)
        .bind(booking.status.as_str())
        .bind(&booking.payment.session_id)
        .bind(&booking.payment.payment_intent_id)
        .bind(booking.updated_at)
        .bind(doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(
        &self,
        id: Uuid,
    ) -> Result<Option<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        let row = sqlx::query("SELECT doc FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn find_by_ref(
        &self,
        booking_ref: &str,
    ) -> Result<Option<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        self.fetch_one_where("SELECT doc FROM bookings WHERE booking_ref = $1", booking_ref)
            .await
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        self.fetch_one_where("SELECT doc FROM bookings WHERE session_id = $1", session_id)
            .await
    }

    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        self.fetch_one_where(
            "SELECT doc FROM bookings WHERE payment_intent_id = $1",
            payment_intent_id,
        )
        .await
    }

    async fn list_by_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        let rows =
            sqlx::query("SELECT doc FROM bookings WHERE user_id = $1 ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn list_pending_payment(
        &self,
        limit: i64,
    ) -> Result<Vec<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query(
            r#"
            SELECT doc FROM bookings
            WHERE status = 'PENDING_PAYMENT'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn list_awaiting_ticketing(
        &self,
        limit: i64,
    ) -> Result<Vec<Booking>, Box<dyn std::error::Error + Send + Sync>> {
        let rows = sqlx::query(
            r#"
            SELECT doc FROM bookings
            WHERE status = 'PAID'
              AND doc -> 'ticketing' ->> 'status' = 'PENDING'
            ORDER BY updated_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::decode).collect()
    }
}

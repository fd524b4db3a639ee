use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{Payment, PaymentStatus, PaymentUpsert},
    error::{AppError, Result},
    repository::PaymentRepository,
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    restaurant_id: String,
    subscription_id: String,
    provider_payment_id: Option<String>,
    provider_invoice_id: Option<String>,
    amount: i64,
    currency: String,
    status: String,
    method: Option<String>,
    description: Option<String>,
    paid_at: Option<NaiveDateTime>,
    invoice_url: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            restaurant_id: Uuid::parse_str(&row.restaurant_id).map_err(|e| AppError::Database(e.to_string()))?,
            subscription_id: Uuid::parse_str(&row.subscription_id).map_err(|e| AppError::Database(e.to_string()))?,
            provider_payment_id: row.provider_payment_id,
            provider_invoice_id: row.provider_invoice_id,
            amount: row.amount,
            currency: row.currency,
            status: Self::parse_payment_status(&row.status)?,
            method: row.method,
            description: row.description,
            paid_at: row.paid_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            invoice_url: row.invoice_url,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    fn parse_payment_status(s: &str) -> Result<PaymentStatus> {
        match s {
            "created" => Ok(PaymentStatus::Created),
            "authorized" => Ok(PaymentStatus::Authorized),
            "captured" => Ok(PaymentStatus::Captured),
            "refunded" => Ok(PaymentStatus::Refunded),
            "failed" => Ok(PaymentStatus::Failed),
            _ => Err(AppError::Database(format!("Invalid payment status: {}", s))),
        }
    }

    /// Inserts `payment` through `sql`, which must start with
    /// `INSERT_PAYMENT` and end in `RETURNING id`.
    async fn insert_returning_id(&self, sql: &str, payment: &PaymentUpsert) -> Result<String> {
        let now = Utc::now().naive_utc();

        let (id,): (String,) = sqlx::query_as(sql)
            .bind(Uuid::new_v4().to_string())
            .bind(payment.restaurant_id.to_string())
            .bind(payment.subscription_id.to_string())
            .bind(&payment.provider_payment_id)
            .bind(&payment.provider_invoice_id)
            .bind(payment.amount)
            .bind(&payment.currency)
            .bind(payment.status.as_str())
            .bind(&payment.method)
            .bind(&payment.description)
            .bind(payment.paid_at.map(|dt| dt.naive_utc()))
            .bind(&payment.invoice_url)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(id)
    }

    /// Overwrites the settled row (one that already has a payment id) for
    /// `invoice_id`, if there is one.
    async fn overwrite_settled_invoice(
        &self,
        invoice_id: &str,
        payment: &PaymentUpsert,
    ) -> Result<Option<String>> {
        let now = Utc::now().naive_utc();

        let row: Option<(String,)> = sqlx::query_as(
            r#"
            UPDATE payments
            SET restaurant_id = ?,
                subscription_id = ?,
                amount = ?,
                currency = ?,
                status = ?,
                method = ?,
                description = ?,
                paid_at = ?,
                invoice_url = COALESCE(?, invoice_url),
                updated_at = ?
            WHERE id = (
                SELECT id FROM payments
                WHERE provider_invoice_id = ? AND provider_payment_id IS NOT NULL
                ORDER BY created_at ASC
                LIMIT 1
            )
            RETURNING id
            "#
        )
        .bind(payment.restaurant_id.to_string())
        .bind(payment.subscription_id.to_string())
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.method)
        .bind(&payment.description)
        .bind(payment.paid_at.map(|dt| dt.naive_utc()))
        .bind(&payment.invoice_url)
        .bind(now)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(|(id,)| id))
    }
}

const INSERT_PAYMENT: &str = r#"
    INSERT INTO payments (
        id, restaurant_id, subscription_id, provider_payment_id,
        provider_invoice_id, amount, currency, status, method,
        description, paid_at, invoice_url, created_at, updated_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

// Provider ids are only ever filled in, never cleared by a later event.
const OVERWRITE_EXISTING: &str = r#"
    DO UPDATE SET
        restaurant_id = excluded.restaurant_id,
        subscription_id = excluded.subscription_id,
        provider_invoice_id = COALESCE(excluded.provider_invoice_id, payments.provider_invoice_id),
        amount = excluded.amount,
        currency = excluded.currency,
        status = excluded.status,
        method = excluded.method,
        description = excluded.description,
        paid_at = excluded.paid_at,
        invoice_url = COALESCE(excluded.invoice_url, payments.invoice_url),
        updated_at = excluded.updated_at
"#;

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    /// Keyed by payment id when the event carries one, otherwise by invoice id.
    /// Each key is backed by a unique index, so concurrent deliveries of the
    /// same payment collapse onto one row.
    async fn upsert(&self, payment: PaymentUpsert) -> Result<Payment> {
        let id = match (&payment.provider_payment_id, &payment.provider_invoice_id) {
            (Some(_), _) => {
                let sql = format!(
                    "{} ON CONFLICT(provider_payment_id) {} RETURNING id",
                    INSERT_PAYMENT, OVERWRITE_EXISTING
                );
                self.insert_returning_id(&sql, &payment).await?
            }
            (None, Some(invoice_id)) => {
                match self.overwrite_settled_invoice(invoice_id, &payment).await? {
                    Some(id) => id,
                    None => {
                        let sql = format!(
                            "{} ON CONFLICT(provider_invoice_id) WHERE provider_payment_id IS NULL {} RETURNING id",
                            INSERT_PAYMENT, OVERWRITE_EXISTING
                        );
                        self.insert_returning_id(&sql, &payment).await?
                    }
                }
            }
            (None, None) => {
                let sql = format!("{} RETURNING id", INSERT_PAYMENT);
                self.insert_returning_id(&sql, &payment).await?
            }
        };

        let id = Uuid::parse_str(&id).map_err(|e| AppError::Database(e.to_string()))?;
        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve upserted payment".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, restaurant_id, subscription_id, provider_payment_id,
                   provider_invoice_id, amount, currency, status, method,
                   description, paid_at, invoice_url, created_at, updated_at
            FROM payments
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_payment(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_provider_payment_id(&self, provider_payment_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, restaurant_id, subscription_id, provider_payment_id,
                   provider_invoice_id, amount, currency, status, method,
                   description, paid_at, invoice_url, created_at, updated_at
            FROM payments
            WHERE provider_payment_id = ?
            ORDER BY created_at ASC
            LIMIT 1
            "#
        )
        .bind(provider_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_payment(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_provider_invoice_id(&self, provider_invoice_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, restaurant_id, subscription_id, provider_payment_id,
                   provider_invoice_id, amount, currency, status, method,
                   description, paid_at, invoice_url, created_at, updated_at
            FROM payments
            WHERE provider_invoice_id = ?
            ORDER BY created_at ASC
            LIMIT 1
            "#
        )
        .bind(provider_invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_payment(r)?)),
            None => Ok(None),
        }
    }

    async fn list_by_restaurant(&self, restaurant_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, restaurant_id, subscription_id, provider_payment_id,
                   provider_invoice_id, amount, currency, status, method,
                   description, paid_at, invoice_url, created_at, updated_at
            FROM payments
            WHERE restaurant_id = ?
            ORDER BY created_at DESC
            "#
        )
        .bind(restaurant_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_payment)
            .collect()
    }
}

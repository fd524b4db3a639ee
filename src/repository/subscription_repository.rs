use async_trait::async_trait;
use chrono::{DateTime, Utc, NaiveDateTime};
use sqlx::{SqlitePool, FromRow};
use uuid::Uuid;

use crate::{
    domain::{BillingInterval, PlanTier, Subscription, SubscriptionStatus},
    error::{AppError, Result},
    repository::SubscriptionRepository,
};

const SELECT_COLUMNS: &str = r#"
    SELECT id, restaurant_id, status, plan, billing_interval,
           current_period_start, current_period_end, trial_end,
           trial_used, cancel_at_period_end, provider_subscription_id,
           version, last_event_at, created_at, updated_at
    FROM subscriptions
"#;

#[derive(FromRow)]
struct SubscriptionRow {
    id: String,
    restaurant_id: String,
    status: String,
    plan: String,
    billing_interval: String,
    current_period_start: Option<NaiveDateTime>,
    current_period_end: Option<NaiveDateTime>,
    trial_end: Option<NaiveDateTime>,
    trial_used: i32,
    cancel_at_period_end: i32,
    provider_subscription_id: Option<String>,
    version: i64,
    last_event_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteSubscriptionRepository {
    pool: SqlitePool,
}

impl SqliteSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_subscription(row: SubscriptionRow) -> Result<Subscription> {
        Ok(Subscription {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            restaurant_id: Uuid::parse_str(&row.restaurant_id).map_err(|e| AppError::Database(e.to_string()))?,
            status: Self::parse_status(&row.status)?,
            plan: Self::parse_plan(&row.plan)?,
            billing_interval: Self::parse_interval(&row.billing_interval)?,
            current_period_start: row.current_period_start.map(to_utc),
            current_period_end: row.current_period_end.map(to_utc),
            trial_end: row.trial_end.map(to_utc),
            trial_used: row.trial_used != 0,
            cancel_at_period_end: row.cancel_at_period_end != 0,
            provider_subscription_id: row.provider_subscription_id,
            version: row.version,
            last_event_at: row.last_event_at.map(to_utc),
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }

    fn parse_status(s: &str) -> Result<SubscriptionStatus> {
        match s {
            "none" => Ok(SubscriptionStatus::None),
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "active" => Ok(SubscriptionStatus::Active),
            "pending" => Ok(SubscriptionStatus::Pending),
            "halted" => Ok(SubscriptionStatus::Halted),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            _ => Err(AppError::Database(format!("Invalid subscription status: {}", s))),
        }
    }

    fn parse_plan(s: &str) -> Result<PlanTier> {
        match s {
            "basic" => Ok(PlanTier::Basic),
            "pro" => Ok(PlanTier::Pro),
            "enterprise" => Ok(PlanTier::Enterprise),
            _ => Err(AppError::Database(format!("Invalid plan tier: {}", s))),
        }
    }

    fn parse_interval(s: &str) -> Result<BillingInterval> {
        match s {
            "monthly" => Ok(BillingInterval::Monthly),
            "yearly" => Ok(BillingInterval::Yearly),
            _ => Err(AppError::Database(format!("Invalid billing interval: {}", s))),
        }
    }

    async fn fetch_one_where(&self, clause: &str, value: String) -> Result<Option<Subscription>> {
        let sql = format!("{} WHERE {} = ?", SELECT_COLUMNS, clause);
        let row = sqlx::query_as::<_, SubscriptionRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(Self::row_to_subscription(r)?)),
            None => Ok(None),
        }
    }
}

fn to_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(dt, Utc)
}

#[async_trait]
impl SubscriptionRepository for SqliteSubscriptionRepository {
    async fn create(&self, subscription: Subscription) -> Result<Subscription> {
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, restaurant_id, status, plan, billing_interval,
                current_period_start, current_period_end, trial_end,
                trial_used, cancel_at_period_end, provider_subscription_id,
                version, last_event_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            "#
        )
        .bind(subscription.id.to_string())
        .bind(subscription.restaurant_id.to_string())
        .bind(subscription.status.as_str())
        .bind(subscription.plan.as_str())
        .bind(subscription.billing_interval.as_str())
        .bind(subscription.current_period_start.map(|dt| dt.naive_utc()))
        .bind(subscription.current_period_end.map(|dt| dt.naive_utc()))
        .bind(subscription.trial_end.map(|dt| dt.naive_utc()))
        .bind(subscription.trial_used as i32)
        .bind(subscription.cancel_at_period_end as i32)
        .bind(&subscription.provider_subscription_id)
        .bind(subscription.last_event_at.map(|dt| dt.naive_utc()))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict("Restaurant already has a subscription".to_string())
            }
            other => AppError::Database(other.to_string()),
        })?;

        self.find_by_id(subscription.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created subscription".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subscription>> {
        self.fetch_one_where("id", id.to_string()).await
    }

    async fn find_by_restaurant(&self, restaurant_id: Uuid) -> Result<Option<Subscription>> {
        self.fetch_one_where("restaurant_id", restaurant_id.to_string()).await
    }

    async fn find_by_provider_id(&self, provider_subscription_id: &str) -> Result<Option<Subscription>> {
        self.fetch_one_where("provider_subscription_id", provider_subscription_id.to_string()).await
    }

    async fn update(&self, subscription: Subscription) -> Result<Subscription> {
        let now = Utc::now().naive_utc();

        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = ?,
                plan = ?,
                billing_interval = ?,
                current_period_start = ?,
                current_period_end = ?,
                trial_end = ?,
                trial_used = ?,
                cancel_at_period_end = ?,
                provider_subscription_id = ?,
                last_event_at = ?,
                version = version + 1,
                updated_at = ?
            WHERE id = ? AND version = ?
            "#
        )
        .bind(subscription.status.as_str())
        .bind(subscription.plan.as_str())
        .bind(subscription.billing_interval.as_str())
        .bind(subscription.current_period_start.map(|dt| dt.naive_utc()))
        .bind(subscription.current_period_end.map(|dt| dt.naive_utc()))
        .bind(subscription.trial_end.map(|dt| dt.naive_utc()))
        .bind(subscription.trial_used as i32)
        .bind(subscription.cancel_at_period_end as i32)
        .bind(&subscription.provider_subscription_id)
        .bind(subscription.last_event_at.map(|dt| dt.naive_utc()))
        .bind(now)
        .bind(subscription.id.to_string())
        .bind(subscription.version)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return match self.find_by_id(subscription.id).await? {
                Some(_) => Err(AppError::ConcurrentModification(format!(
                    "subscription {}",
                    subscription.id
                ))),
                None => Err(AppError::NotFound(format!(
                    "Subscription {} not found",
                    subscription.id
                ))),
            };
        }

        self.find_by_id(subscription.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve updated subscription".to_string())
        })
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM subscriptions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

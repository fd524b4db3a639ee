#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use menuqr::{
    api::{self, state::AppState},
    config::Settings,
    domain::{BillingInterval, PlanTier, Subscription, SubscriptionStatus},
    error::{AppError, Result},
    payments::{webhook::compute_signature, BillingGateway, ProviderSubscription, SIGNATURE_HEADER},
    repository::{SqliteSubscriptionRepository, SubscriptionRepository},
    service::ServiceContext,
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const JWT_SECRET: &str = "test-jwt-secret";

/// In-memory SQLite with migrations applied. A single connection, since every
/// `:memory:` connection is its own database.
pub async fn setup_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await?;

    Ok(pool)
}

/// File-backed SQLite in the temp dir, for tests that need several
/// connections writing at once. Remove it with `remove_db_files`.
pub async fn setup_file_pool(max_connections: u32) -> anyhow::Result<(SqlitePool, PathBuf)> {
    let path = std::env::temp_dir().join(format!("menuqr-test-{}.db", Uuid::new_v4()));
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await?;

    Ok((pool, path))
}

pub async fn remove_db_files(pool: SqlitePool, path: PathBuf) {
    pool.close().await;
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}

pub fn test_settings(webhook_secret: Option<&str>) -> Settings {
    let mut settings = Settings::default();
    settings.auth.jwt_secret = JWT_SECRET.to_string();
    settings.razorpay.enabled = true;
    settings.razorpay.webhook_secret = webhook_secret.map(str::to_string);
    settings.razorpay.plans.insert("pro_monthly".to_string(), "plan_pro_m".to_string());
    settings.razorpay.plans.insert("basic_yearly".to_string(), "plan_basic_y".to_string());
    settings
}

/// Records gateway calls instead of talking to Razorpay.
#[derive(Default)]
pub struct FakeGateway {
    pub created: Mutex<Vec<(String, u32)>>,
    pub cancelled: Mutex<Vec<(String, bool)>>,
    pub fail: bool,
}

impl FakeGateway {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl BillingGateway for FakeGateway {
    async fn create_subscription(
        &self,
        plan_id: &str,
        total_count: u32,
        _notes: HashMap<String, String>,
    ) -> Result<ProviderSubscription> {
        if self.fail {
            return Err(AppError::External("gateway down".to_string()));
        }
        let mut created = self.created.lock().unwrap();
        created.push((plan_id.to_string(), total_count));
        let id = format!("sub_fake{}", created.len());
        Ok(ProviderSubscription {
            short_url: Some(format!("https://rzp.io/i/{}", id)),
            id,
            status: "created".to_string(),
        })
    }

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_cycle_end: bool,
    ) -> Result<ProviderSubscription> {
        if self.fail {
            return Err(AppError::External("gateway down".to_string()));
        }
        self.cancelled
            .lock()
            .unwrap()
            .push((provider_subscription_id.to_string(), at_cycle_end));
        Ok(ProviderSubscription {
            id: provider_subscription_id.to_string(),
            status: "cancelled".to_string(),
            short_url: None,
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub pool: SqlitePool,
    pub context: Arc<ServiceContext>,
    pub gateway: Arc<FakeGateway>,
}

pub async fn spawn_app(webhook_secret: Option<&str>) -> anyhow::Result<TestApp> {
    spawn_app_with_gateway(webhook_secret, Arc::new(FakeGateway::default())).await
}

pub async fn spawn_app_with_gateway(
    webhook_secret: Option<&str>,
    gateway: Arc<FakeGateway>,
) -> anyhow::Result<TestApp> {
    let pool = setup_pool().await?;
    let settings = test_settings(webhook_secret);
    let dyn_gateway: Arc<dyn BillingGateway> = gateway.clone();
    let context = Arc::new(ServiceContext::new(pool.clone(), Some(dyn_gateway), &settings));
    let router = api::create_app(AppState::new(context.clone(), Arc::new(settings)));

    Ok(TestApp {
        router,
        pool,
        context,
        gateway,
    })
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub fn token_for(&self, restaurant_id: Uuid) -> String {
        self.context
            .token_service
            .issue("owner@example.com", restaurant_id, chrono::Duration::hours(1))
            .expect("token signs")
    }
}

/// Inserts a subscription already linked to `provider_id`.
pub async fn insert_subscription(
    pool: &SqlitePool,
    provider_id: &str,
    status: SubscriptionStatus,
) -> anyhow::Result<Subscription> {
    let repo = SqliteSubscriptionRepository::new(pool.clone());
    let mut sub = Subscription::new(Uuid::new_v4(), PlanTier::Pro, BillingInterval::Monthly);
    sub.status = status;
    sub.provider_subscription_id = Some(provider_id.to_string());
    Ok(repo.create(sub).await?)
}

pub fn signed_webhook(body: &str, secret: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/billing/webhook/razorpay")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, compute_signature(secret, body.as_bytes()))
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    serde_json::from_slice(&bytes).expect("body is JSON")
}

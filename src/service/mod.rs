pub mod billing_service;
pub mod webhook_service;

use std::sync::Arc;
use sqlx::SqlitePool;
use crate::auth::TokenService;
use crate::config::Settings;
use crate::payments::BillingGateway;
use crate::repository::*;
use billing_service::BillingService;
use webhook_service::WebhookService;

pub use billing_service::SubscribeResponse;
pub use webhook_service::{IgnoreReason, WebhookOutcome};

pub struct ServiceContext {
    pub subscription_repo: Arc<dyn SubscriptionRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub billing_service: Arc<BillingService>,
    pub webhook_service: Arc<WebhookService>,
    pub token_service: Arc<TokenService>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        db_pool: SqlitePool,
        gateway: Option<Arc<dyn BillingGateway>>,
        settings: &Settings,
    ) -> Self {
        let subscription_repo: Arc<dyn SubscriptionRepository> =
            Arc::new(SqliteSubscriptionRepository::new(db_pool.clone()));
        let payment_repo: Arc<dyn PaymentRepository> =
            Arc::new(SqlitePaymentRepository::new(db_pool.clone()));

        let billing_service = Arc::new(BillingService::new(
            subscription_repo.clone(),
            payment_repo.clone(),
            gateway,
            settings.razorpay.clone(),
        ));
        let webhook_service = Arc::new(WebhookService::new(
            subscription_repo.clone(),
            payment_repo.clone(),
        ));
        let token_service = Arc::new(TokenService::new(&settings.auth.jwt_secret));

        Self {
            subscription_repo,
            payment_repo,
            billing_service,
            webhook_service,
            token_service,
            db_pool,
        }
    }
}

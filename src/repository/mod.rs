use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::*;
use crate::error::Result;

pub mod subscription_repository;
pub mod payment_repository;

pub use subscription_repository::SqliteSubscriptionRepository;
pub use payment_repository::SqlitePaymentRepository;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create(&self, subscription: Subscription) -> Result<Subscription>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Subscription>>;
    async fn find_by_restaurant(&self, restaurant_id: Uuid) -> Result<Option<Subscription>>;
    async fn find_by_provider_id(&self, provider_subscription_id: &str) -> Result<Option<Subscription>>;
    /// Writes `subscription` if the stored version still equals
    /// `subscription.version`, returning the row with the bumped version.
    /// Fails with `AppError::ConcurrentModification` otherwise.
    async fn update(&self, subscription: Subscription) -> Result<Subscription>;
    async fn count(&self) -> Result<i64>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn upsert(&self, payment: PaymentUpsert) -> Result<Payment>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>>;
    async fn find_by_provider_payment_id(&self, provider_payment_id: &str) -> Result<Option<Payment>>;
    async fn find_by_provider_invoice_id(&self, provider_invoice_id: &str) -> Result<Option<Payment>>;
    async fn list_by_restaurant(&self, restaurant_id: Uuid) -> Result<Vec<Payment>>;
}

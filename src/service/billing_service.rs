use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::RazorpayConfig,
    domain::{
        CancelSubscriptionRequest, CreateSubscriptionRequest, Payment, Subscription,
        SubscriptionStatus, SubscriptionSummary,
    },
    error::{AppError, Result},
    payments::BillingGateway,
    repository::{PaymentRepository, SubscriptionRepository},
};

#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub subscription: SubscriptionSummary,
    /// Razorpay hosted page where the tenant authorizes the mandate.
    pub checkout_url: Option<String>,
}

pub struct BillingService {
    subscription_repo: Arc<dyn SubscriptionRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
    gateway: Option<Arc<dyn BillingGateway>>,
    razorpay: RazorpayConfig,
}

impl BillingService {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        gateway: Option<Arc<dyn BillingGateway>>,
        razorpay: RazorpayConfig,
    ) -> Self {
        Self {
            subscription_repo,
            payment_repo,
            gateway,
            razorpay,
        }
    }

    fn gateway(&self) -> Result<&Arc<dyn BillingGateway>> {
        self.gateway
            .as_ref()
            .ok_or_else(|| AppError::Configuration("Razorpay payment processing is disabled".to_string()))
    }

    pub async fn get(&self, restaurant_id: Uuid) -> Result<SubscriptionSummary> {
        Ok(self
            .subscription_repo
            .find_by_restaurant(restaurant_id)
            .await?
            .as_ref()
            .map(SubscriptionSummary::from)
            .unwrap_or_else(SubscriptionSummary::none))
    }

    /// Starts a provider subscription for the tenant. The local row is left
    /// `pending`; webhooks move it on once the mandate is authorized.
    pub async fn subscribe(
        &self,
        restaurant_id: Uuid,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscribeResponse> {
        let gateway = self.gateway()?;
        let plan_id = self
            .razorpay
            .plan_id(&request.plan, &request.interval)
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "No {} plan is offered for {} billing",
                    request.plan.as_str(),
                    request.interval.as_str()
                ))
            })?
            .to_string();

        let existing = self.subscription_repo.find_by_restaurant(restaurant_id).await?;
        if let Some(ref sub) = existing {
            if sub.is_entitled() {
                return Err(AppError::Conflict(
                    "Restaurant already has an active subscription".to_string(),
                ));
            }
        }

        let mut notes = HashMap::new();
        notes.insert("restaurant_id".to_string(), restaurant_id.to_string());
        notes.insert("plan".to_string(), request.plan.as_str().to_string());

        let created = gateway
            .create_subscription(&plan_id, self.razorpay.total_count(&request.interval), notes)
            .await?;

        let saved = match existing {
            Some(mut sub) => {
                sub.plan = request.plan;
                sub.billing_interval = request.interval;
                sub.status = SubscriptionStatus::Pending;
                sub.provider_subscription_id = Some(created.id.clone());
                sub.cancel_at_period_end = false;
                sub.current_period_start = None;
                sub.current_period_end = None;
                // Events from the previous provider subscription must not be
                // compared against the new one.
                sub.last_event_at = None;
                self.subscription_repo.update(sub).await?
            }
            None => {
                let mut sub = Subscription::new(restaurant_id, request.plan, request.interval);
                sub.status = SubscriptionStatus::Pending;
                sub.provider_subscription_id = Some(created.id.clone());
                self.subscription_repo.create(sub).await?
            }
        };

        tracing::info!(
            %restaurant_id,
            subscription_id = %saved.id,
            provider_subscription_id = %created.id,
            plan = saved.plan.as_str(),
            "Subscription created"
        );

        Ok(SubscribeResponse {
            subscription: SubscriptionSummary::from(&saved),
            checkout_url: created.short_url,
        })
    }

    /// User-initiated cancellation. With `at_period_end` the row keeps its
    /// status until Razorpay sends `subscription.cancelled`.
    pub async fn cancel(
        &self,
        restaurant_id: Uuid,
        request: CancelSubscriptionRequest,
    ) -> Result<SubscriptionSummary> {
        let gateway = self.gateway()?;
        let mut sub = self
            .subscription_repo
            .find_by_restaurant(restaurant_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No subscription for this restaurant".to_string()))?;

        if sub.status == SubscriptionStatus::Cancelled {
            return Err(AppError::Conflict("Subscription is already cancelled".to_string()));
        }

        let provider_id = sub
            .provider_subscription_id
            .clone()
            .ok_or_else(|| AppError::NotFound("Subscription has no provider reference".to_string()))?;

        gateway
            .cancel_subscription(&provider_id, request.at_period_end)
            .await?;

        if request.at_period_end {
            sub.cancel_at_period_end = true;
        } else {
            sub.status = SubscriptionStatus::Cancelled;
            sub.cancel_at_period_end = false;
            sub.current_period_end = None;
        }

        let saved = self.subscription_repo.update(sub).await?;
        tracing::info!(
            %restaurant_id,
            subscription_id = %saved.id,
            at_period_end = request.at_period_end,
            "Subscription cancelled"
        );

        Ok(SubscriptionSummary::from(&saved))
    }

    pub async fn list_payments(&self, restaurant_id: Uuid) -> Result<Vec<Payment>> {
        self.payment_repo.list_by_restaurant(restaurant_id).await
    }
}

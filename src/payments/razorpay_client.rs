use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    config::RazorpayConfig,
    error::{AppError, Result},
};

/// Subscription as reported back by the payment provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub short_url: Option<String>,
}

/// Outbound calls to the payment provider.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    async fn create_subscription(
        &self,
        plan_id: &str,
        total_count: u32,
        notes: HashMap<String, String>,
    ) -> Result<ProviderSubscription>;

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_cycle_end: bool,
    ) -> Result<ProviderSubscription>;
}

#[derive(Debug, Serialize)]
struct CreateSubscriptionBody<'a> {
    plan_id: &'a str,
    total_count: u32,
    customer_notify: u8,
    notes: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct CancelSubscriptionBody {
    cancel_at_cycle_end: u8,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorEnvelope {
    error: RazorpayErrorBody,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

pub struct RazorpayClient {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(config: &RazorpayConfig) -> Result<Self> {
        let key_id = config
            .key_id
            .clone()
            .ok_or_else(|| AppError::Configuration("razorpay.key_id is not set".to_string()))?;
        let key_secret = config
            .key_secret
            .clone()
            .ok_or_else(|| AppError::Configuration("razorpay.key_secret is not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            key_id,
            key_secret,
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ProviderSubscription> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::External(format!("Razorpay request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<RazorpayErrorEnvelope>(&text)
                .ok()
                .map(|env| {
                    format!(
                        "{}: {}",
                        env.error.code.unwrap_or_default(),
                        env.error.description.unwrap_or_default()
                    )
                })
                .unwrap_or(text);
            tracing::warn!(%status, path, "Razorpay API error: {}", detail);
            return Err(AppError::External(format!("Razorpay error ({}): {}", status, detail)));
        }

        response
            .json::<ProviderSubscription>()
            .await
            .map_err(|e| AppError::External(format!("Invalid Razorpay response: {}", e)))
    }
}

#[async_trait]
impl BillingGateway for RazorpayClient {
    async fn create_subscription(
        &self,
        plan_id: &str,
        total_count: u32,
        notes: HashMap<String, String>,
    ) -> Result<ProviderSubscription> {
        let body = CreateSubscriptionBody {
            plan_id,
            total_count,
            customer_notify: 1,
            notes,
        };
        let created = self.post("/v1/subscriptions", &body).await?;
        tracing::info!(provider_subscription_id = %created.id, "Created Razorpay subscription");
        Ok(created)
    }

    async fn cancel_subscription(
        &self,
        provider_subscription_id: &str,
        at_cycle_end: bool,
    ) -> Result<ProviderSubscription> {
        let body = CancelSubscriptionBody {
            cancel_at_cycle_end: at_cycle_end as u8,
        };
        let path = format!("/v1/subscriptions/{}/cancel", provider_subscription_id);
        let cancelled = self.post(&path, &body).await?;
        tracing::info!(provider_subscription_id, at_cycle_end, "Cancelled Razorpay subscription");
        Ok(cancelled)
    }
}

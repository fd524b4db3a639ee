use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub status: SubscriptionStatus,
    pub plan: PlanTier,
    pub billing_interval: BillingInterval,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub trial_used: bool,
    pub cancel_at_period_end: bool,
    pub provider_subscription_id: Option<String>,
    /// Bumped on every write; updates are compare-and-swap on this value.
    #[serde(skip)]
    pub version: i64,
    /// Envelope timestamp of the newest provider event applied to this row.
    #[serde(skip)]
    pub last_event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(restaurant_id: Uuid, plan: PlanTier, billing_interval: BillingInterval) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            restaurant_id,
            status: SubscriptionStatus::None,
            plan,
            billing_interval,
            current_period_start: None,
            current_period_end: None,
            trial_end: None,
            trial_used: false,
            cancel_at_period_end: false,
            provider_subscription_id: None,
            version: 0,
            last_event_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the tenant currently has access to paid features.
    pub fn is_entitled(&self) -> bool {
        matches!(self.status, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    None,
    Trialing,
    Active,
    Pending,
    Halted,
    PastDue,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Halted => "halted",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Basic,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Basic => "basic",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Monthly,
    Yearly,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Monthly => "monthly",
            BillingInterval::Yearly => "yearly",
        }
    }
}

/// Tenant-facing view of billing state. Tenants that never subscribed get
/// `status: none` with no plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSummary {
    pub status: SubscriptionStatus,
    pub plan: Option<PlanTier>,
    pub billing_interval: Option<BillingInterval>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub trial_used: bool,
    pub cancel_at_period_end: bool,
    pub entitled: bool,
}

impl SubscriptionSummary {
    pub fn none() -> Self {
        Self {
            status: SubscriptionStatus::None,
            plan: None,
            billing_interval: None,
            current_period_start: None,
            current_period_end: None,
            trial_end: None,
            trial_used: false,
            cancel_at_period_end: false,
            entitled: false,
        }
    }
}

impl From<&Subscription> for SubscriptionSummary {
    fn from(sub: &Subscription) -> Self {
        Self {
            status: sub.status,
            plan: Some(sub.plan),
            billing_interval: Some(sub.billing_interval),
            current_period_start: sub.current_period_start,
            current_period_end: sub.current_period_end,
            trial_end: sub.trial_end,
            trial_used: sub.trial_used,
            cancel_at_period_end: sub.cancel_at_period_end,
            entitled: sub.is_entitled(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub plan: PlanTier,
    pub interval: BillingInterval,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CancelSubscriptionRequest {
    #[serde(default)]
    pub at_period_end: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
        assert_eq!(SubscriptionStatus::PastDue.as_str(), "past_due");
    }

    #[test]
    fn test_new_subscription_has_no_status() {
        let sub = Subscription::new(Uuid::new_v4(), PlanTier::Basic, BillingInterval::Monthly);
        assert_eq!(sub.status, SubscriptionStatus::None);
        assert!(!sub.is_entitled());
        assert_eq!(sub.version, 0);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub restaurant_id: Uuid,
    pub subscription_id: Uuid,
    pub provider_payment_id: Option<String>,
    pub provider_invoice_id: Option<String>,
    /// Minor currency units (paise for INR).
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: Option<String>,
    pub description: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub invoice_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Authorized,
    Captured,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Failed => "failed",
        }
    }
}

/// Ledger write produced from a webhook. Matched against existing rows by
/// provider payment id, then provider invoice id.
#[derive(Debug, Clone)]
pub struct PaymentUpsert {
    pub restaurant_id: Uuid,
    pub subscription_id: Uuid,
    pub provider_payment_id: Option<String>,
    pub provider_invoice_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: Option<String>,
    pub description: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub invoice_url: Option<String>,
}

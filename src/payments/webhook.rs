//! Razorpay webhook verification and payload model.
//!
//! Razorpay signs the exact request body with HMAC-SHA256 using the webhook
//! secret and sends the hex digest in `x-razorpay-signature`. Verification must
//! run over the raw bytes received; re-serialized JSON will not match.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Hex-encoded HMAC-SHA256 of `payload` under `secret`.
pub fn compute_signature(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let expected = compute_signature(secret, payload);
    let expected_bytes = expected.as_bytes();
    let provided_bytes = signature.trim().as_bytes();

    // Signature length is not secret; it is always 64 hex chars.
    if expected_bytes.len() != provided_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(provided_bytes).into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayWebhookEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub account_id: Option<String>,
    /// Envelope timestamp (Unix seconds) assigned by Razorpay.
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    pub subscription: Option<Wrapped<SubscriptionEntity>>,
    #[serde(default)]
    pub payment: Option<Wrapped<PaymentEntity>>,
    #[serde(default)]
    pub invoice: Option<Wrapped<InvoiceEntity>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Wrapped<T> {
    pub entity: T,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionEntity {
    pub id: Option<String>,
    pub current_start: Option<i64>,
    pub current_end: Option<i64>,
    pub start_at: Option<i64>,
    pub charge_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentEntity {
    pub id: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub method: Option<String>,
    pub description: Option<String>,
    pub invoice_id: Option<String>,
    pub subscription_id: Option<String>,
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceEntity {
    pub id: Option<String>,
    pub subscription_id: Option<String>,
    pub payment_id: Option<String>,
    pub amount: Option<i64>,
    pub amount_paid: Option<i64>,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub short_url: Option<String>,
    pub paid_at: Option<i64>,
    pub billing_start: Option<i64>,
    pub billing_end: Option<i64>,
}

/// Event names this service reacts to. Anything else parses to `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    SubscriptionAuthenticated,
    SubscriptionActivated,
    SubscriptionPending,
    SubscriptionHalted,
    SubscriptionPaused,
    SubscriptionCancelled,
    SubscriptionCompleted,
    SubscriptionCharged,
    PaymentRefunded,
    PaymentFailed,
    PaymentAuthorized,
    PaymentCaptured,
    InvoicePaid,
    Unknown(String),
}

impl EventKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "subscription.authenticated" => EventKind::SubscriptionAuthenticated,
            "subscription.activated" => EventKind::SubscriptionActivated,
            "subscription.pending" => EventKind::SubscriptionPending,
            "subscription.halted" => EventKind::SubscriptionHalted,
            "subscription.paused" => EventKind::SubscriptionPaused,
            "subscription.cancelled" => EventKind::SubscriptionCancelled,
            "subscription.completed" => EventKind::SubscriptionCompleted,
            "subscription.charged" => EventKind::SubscriptionCharged,
            "payment.refunded" => EventKind::PaymentRefunded,
            "payment.failed" => EventKind::PaymentFailed,
            "payment.authorized" => EventKind::PaymentAuthorized,
            "payment.captured" => EventKind::PaymentCaptured,
            "invoice.paid" => EventKind::InvoicePaid,
            other => EventKind::Unknown(other.to_string()),
        }
    }
}

impl RazorpayWebhookEvent {
    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.event)
    }

    pub fn subscription(&self) -> Option<&SubscriptionEntity> {
        self.payload.subscription.as_ref().map(|w| &w.entity)
    }

    pub fn payment(&self) -> Option<&PaymentEntity> {
        self.payload.payment.as_ref().map(|w| &w.entity)
    }

    pub fn invoice(&self) -> Option<&InvoiceEntity> {
        self.payload.invoice.as_ref().map(|w| &w.entity)
    }

    /// Provider subscription id, taken from the subscription entity, then the
    /// payment's subscription reference, then the invoice's. First hit wins.
    pub fn provider_subscription_id(&self) -> Option<&str> {
        self.subscription()
            .and_then(|s| s.id.as_deref())
            .or_else(|| self.payment().and_then(|p| p.subscription_id.as_deref()))
            .or_else(|| self.invoice().and_then(|i| i.subscription_id.as_deref()))
            .filter(|id| !id.is_empty())
    }

    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.and_then(from_unix)
    }
}

pub fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

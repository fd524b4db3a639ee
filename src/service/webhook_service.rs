use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    domain::{PaymentStatus, PaymentUpsert, Subscription, SubscriptionStatus},
    error::{AppError, Result},
    payments::webhook::{from_unix, EventKind, RazorpayWebhookEvent},
    repository::{PaymentRepository, SubscriptionRepository},
};

/// Compare-and-swap attempts before giving up and letting Razorpay retry.
const MAX_WRITE_ATTEMPTS: usize = 3;

const DEFAULT_CURRENCY: &str = "INR";

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    Applied {
        subscription_id: Uuid,
        status: SubscriptionStatus,
    },
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UnhandledEvent,
    UnrecognizedPayload,
    NoSubscriptionReference,
    UnknownSubscription,
    StaleEvent,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::UnhandledEvent => "unhandled event",
            IgnoreReason::UnrecognizedPayload => "unrecognized payload",
            IgnoreReason::NoSubscriptionReference => "no subscription reference",
            IgnoreReason::UnknownSubscription => "subscription not found",
            IgnoreReason::StaleEvent => "stale event",
        }
    }
}

/// What an event did to a subscription, computed before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Effect {
    pub changed: bool,
    pub ledger: Option<PaymentStatus>,
}

impl Effect {
    fn status_change(ledger: Option<PaymentStatus>) -> Self {
        Self { changed: true, ledger }
    }

    fn ledger_only(status: PaymentStatus) -> Self {
        Self { changed: false, ledger: Some(status) }
    }

    fn none() -> Self {
        Self { changed: false, ledger: None }
    }
}

pub struct WebhookService {
    subscription_repo: Arc<dyn SubscriptionRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
}

impl WebhookService {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
    ) -> Self {
        Self {
            subscription_repo,
            payment_repo,
        }
    }

    /// Reconciles the local subscription with a verified Razorpay event.
    ///
    /// Events that reference no known subscription are ignored rather than
    /// rejected so the provider stops redelivering them. Errors returned from
    /// here mean the subscription write failed and the event should be retried.
    pub async fn process(&self, event: &RazorpayWebhookEvent) -> Result<WebhookOutcome> {
        let kind = event.kind();
        if let EventKind::Unknown(ref name) = kind {
            tracing::debug!(event = %name, "Unhandled Razorpay webhook event");
            return Ok(WebhookOutcome::Ignored(IgnoreReason::UnhandledEvent));
        }

        let Some(provider_id) = event.provider_subscription_id() else {
            tracing::info!(event = %event.event, "Webhook carries no subscription reference");
            return Ok(WebhookOutcome::Ignored(IgnoreReason::NoSubscriptionReference));
        };

        let Some(mut current) = self.subscription_repo.find_by_provider_id(provider_id).await? else {
            tracing::info!(
                event = %event.event,
                account_id = event.account_id.as_deref().unwrap_or(""),
                provider_subscription_id = provider_id,
                "Webhook for unknown subscription"
            );
            return Ok(WebhookOutcome::Ignored(IgnoreReason::UnknownSubscription));
        };

        let occurred_at = event.occurred_at();
        let mut attempt = 0;

        let (subscription, effect) = loop {
            attempt += 1;

            if is_stale(&current, occurred_at) {
                tracing::warn!(
                    event = %event.event,
                    subscription_id = %current.id,
                    "Ignoring webhook older than the last applied event"
                );
                return Ok(WebhookOutcome::Ignored(IgnoreReason::StaleEvent));
            }

            let mut next = current.clone();
            let effect = apply_event(&mut next, &kind, event);
            if !effect.changed {
                break (current, effect);
            }

            if let Some(at) = occurred_at {
                next.last_event_at = Some(next.last_event_at.map_or(at, |last| last.max(at)));
            }

            match self.subscription_repo.update(next).await {
                Ok(saved) => break (saved, effect),
                Err(AppError::ConcurrentModification(_)) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::warn!(
                        subscription_id = %current.id,
                        attempt,
                        "Subscription changed underneath webhook; re-applying"
                    );
                    current = self
                        .subscription_repo
                        .find_by_id(current.id)
                        .await?
                        .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", current.id)))?;
                }
                Err(e) => return Err(e),
            }
        };

        tracing::info!(
            event = %event.event,
            account_id = event.account_id.as_deref().unwrap_or(""),
            subscription_id = %subscription.id,
            status = subscription.status.as_str(),
            "Applied Razorpay webhook"
        );

        if let Some(status) = effect.ledger {
            // Ledger writes never fail the webhook; the status change above is what matters.
            if let Err(e) = self.record_payment(&subscription, event, status).await {
                tracing::error!(
                    error = %e,
                    event = %event.event,
                    subscription_id = %subscription.id,
                    "Failed to record payment from webhook"
                );
            }
        }

        Ok(WebhookOutcome::Applied {
            subscription_id: subscription.id,
            status: subscription.status,
        })
    }

    async fn record_payment(
        &self,
        subscription: &Subscription,
        event: &RazorpayWebhookEvent,
        status: PaymentStatus,
    ) -> Result<()> {
        let Some(entry) = ledger_entry(subscription, event, status) else {
            tracing::debug!(event = %event.event, "No payment or invoice entity to record");
            return Ok(());
        };

        let payment = self.payment_repo.upsert(entry).await?;
        tracing::info!(
            payment_id = %payment.id,
            provider_payment_id = payment.provider_payment_id.as_deref().unwrap_or(""),
            status = payment.status.as_str(),
            amount = payment.amount,
            "Recorded payment"
        );
        Ok(())
    }
}

fn is_stale(subscription: &Subscription, occurred_at: Option<DateTime<Utc>>) -> bool {
    match (occurred_at, subscription.last_event_at) {
        (Some(at), Some(last)) => at < last,
        _ => false,
    }
}

fn set_period_bounds(subscription: &mut Subscription, start: Option<i64>, end: Option<i64>) {
    if let Some(start) = start.and_then(from_unix) {
        subscription.current_period_start = Some(start);
    }
    if let Some(end) = end.and_then(from_unix) {
        subscription.current_period_end = Some(end);
    }
}

/// Activation shared by activated/completed/charged and the payment-success events.
fn activate(subscription: &mut Subscription, start: Option<i64>, end: Option<i64>) {
    subscription.status = SubscriptionStatus::Active;
    subscription.trial_end = None;
    set_period_bounds(subscription, start, end);
}

/// Applies the event-to-status table to `subscription` in memory. No prior
/// state is consulted; a late success event can reactivate a cancelled row.
pub(crate) fn apply_event(
    subscription: &mut Subscription,
    kind: &EventKind,
    event: &RazorpayWebhookEvent,
) -> Effect {
    let entity = event.subscription();
    let entity_start = entity.and_then(|s| s.current_start);
    let entity_end = entity.and_then(|s| s.current_end);

    match kind {
        EventKind::SubscriptionAuthenticated => {
            subscription.status = SubscriptionStatus::Trialing;
            subscription.trial_end = entity
                .and_then(|s| s.start_at.or(s.charge_at))
                .and_then(from_unix)
                .or(subscription.trial_end);
            subscription.trial_used = true;
            Effect::status_change(None)
        }
        EventKind::SubscriptionActivated | EventKind::SubscriptionCompleted => {
            activate(subscription, entity_start, entity_end);
            Effect::status_change(None)
        }
        EventKind::SubscriptionCharged => {
            activate(subscription, entity_start, entity_end);
            Effect::status_change(Some(PaymentStatus::Captured))
        }
        EventKind::SubscriptionPending => {
            subscription.status = SubscriptionStatus::Pending;
            Effect::status_change(None)
        }
        EventKind::SubscriptionHalted | EventKind::SubscriptionPaused => {
            subscription.status = SubscriptionStatus::Halted;
            Effect::status_change(None)
        }
        EventKind::SubscriptionCancelled => {
            subscription.status = SubscriptionStatus::Cancelled;
            subscription.cancel_at_period_end = false;
            subscription.current_period_end = None;
            Effect::status_change(None)
        }
        EventKind::PaymentRefunded => Effect::ledger_only(PaymentStatus::Refunded),
        EventKind::PaymentFailed => {
            let referenced = event.payment().and_then(|p| p.subscription_id.as_deref());
            let matches = referenced.is_some()
                && referenced == subscription.provider_subscription_id.as_deref();
            if matches {
                subscription.status = SubscriptionStatus::PastDue;
                Effect::status_change(Some(PaymentStatus::Failed))
            } else {
                Effect::none()
            }
        }
        EventKind::InvoicePaid | EventKind::PaymentCaptured | EventKind::PaymentAuthorized => {
            let (start, end) = match event.invoice() {
                Some(invoice) if invoice.billing_start.is_some() || invoice.billing_end.is_some() => {
                    (invoice.billing_start, invoice.billing_end)
                }
                _ => (entity_start, entity_end),
            };
            activate(subscription, start, end);
            let ledger = if *kind == EventKind::PaymentAuthorized {
                PaymentStatus::Authorized
            } else {
                PaymentStatus::Captured
            };
            Effect::status_change(Some(ledger))
        }
        EventKind::Unknown(_) => Effect::none(),
    }
}

/// Builds the ledger row for an event, or `None` when it carries neither a
/// payment nor an invoice entity.
pub(crate) fn ledger_entry(
    subscription: &Subscription,
    event: &RazorpayWebhookEvent,
    status: PaymentStatus,
) -> Option<PaymentUpsert> {
    let payment = event.payment();
    let invoice = event.invoice();
    if payment.is_none() && invoice.is_none() {
        return None;
    }

    let amount = payment
        .and_then(|p| p.amount)
        .or_else(|| invoice.and_then(|i| i.amount_paid))
        .or_else(|| invoice.and_then(|i| i.amount))
        .unwrap_or(0);

    let currency = payment
        .and_then(|p| p.currency.clone())
        .or_else(|| invoice.and_then(|i| i.currency.clone()))
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let description = payment
        .and_then(|p| p.description.clone())
        .or_else(|| invoice.and_then(|i| i.description.clone()))
        .or_else(|| Some(event.event.clone()));

    let paid_at = match status {
        PaymentStatus::Failed => None,
        _ => payment
            .and_then(|p| p.created_at)
            .or_else(|| invoice.and_then(|i| i.paid_at))
            .and_then(from_unix),
    };

    Some(PaymentUpsert {
        restaurant_id: subscription.restaurant_id,
        subscription_id: subscription.id,
        provider_payment_id: payment
            .and_then(|p| p.id.clone())
            .or_else(|| invoice.and_then(|i| i.payment_id.clone())),
        provider_invoice_id: payment
            .and_then(|p| p.invoice_id.clone())
            .or_else(|| invoice.and_then(|i| i.id.clone())),
        amount,
        currency,
        status,
        method: payment.and_then(|p| p.method.clone()),
        description,
        paid_at,
        invoice_url: invoice.and_then(|i| i.short_url.clone()),
    })
}

pub mod razorpay_client;
pub mod webhook;

pub use razorpay_client::{BillingGateway, ProviderSubscription, RazorpayClient};
pub use webhook::{RazorpayWebhookEvent, SIGNATURE_HEADER};

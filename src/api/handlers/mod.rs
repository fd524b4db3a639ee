pub mod billing;
pub mod root;
pub mod webhooks;

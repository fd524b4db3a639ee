use std::collections::HashMap;

use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

use crate::domain::{BillingInterval, PlanTier};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub razorpay: RazorpayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HS256 secret shared with the service that issues tenant tokens.
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RazorpayConfig {
    #[serde(default)]
    pub enabled: bool,
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    /// Checked independently of `enabled`: the webhook endpoint refuses every
    /// request while this is unset.
    pub webhook_secret: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_total_count_monthly")]
    pub total_count_monthly: u32,
    #[serde(default = "default_total_count_yearly")]
    pub total_count_yearly: u32,
    /// Razorpay plan ids keyed by `<tier>_<interval>`, e.g. `pro_monthly`.
    #[serde(default)]
    pub plans: HashMap<String, String>,
}

fn default_api_base_url() -> String {
    "https://api.razorpay.com".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_total_count_monthly() -> u32 {
    120
}

fn default_total_count_yearly() -> u32 {
    10
}

impl Default for RazorpayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key_id: None,
            key_secret: None,
            webhook_secret: None,
            api_base_url: default_api_base_url(),
            timeout_secs: default_timeout_secs(),
            total_count_monthly: default_total_count_monthly(),
            total_count_yearly: default_total_count_yearly(),
            plans: HashMap::new(),
        }
    }
}

impl RazorpayConfig {
    pub fn plan_id(&self, plan: &PlanTier, interval: &BillingInterval) -> Option<&str> {
        let key = format!("{}_{}", plan.as_str(), interval.as_str());
        self.plans.get(&key).map(String::as_str)
    }

    /// Number of billing cycles requested when creating a provider subscription.
    pub fn total_count(&self, interval: &BillingInterval) -> u32 {
        match interval {
            BillingInterval::Monthly => self.total_count_monthly,
            BillingInterval::Yearly => self.total_count_yearly,
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite://menuqr.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("razorpay.enabled", false)?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with MENUQR__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("MENUQR").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://menuqr.db?mode=rwc".to_string(),
                max_connections: 10,
            },
            auth: AuthConfig {
                jwt_secret: "change-me-in-production".to_string(),
            },
            razorpay: RazorpayConfig::default(),
        }
    }
}

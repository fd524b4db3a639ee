use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use fake::{faker::company::en::CompanyName, Fake};
use menuqr::{
    auth::TokenService,
    domain::{BillingInterval, PaymentStatus, PaymentUpsert, PlanTier, Subscription, SubscriptionStatus},
    payments::webhook::compute_signature,
    repository::{
        PaymentRepository, SqlitePaymentRepository,
        SqliteSubscriptionRepository, SubscriptionRepository,
    },
};
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

/// Development helper: seeds demo billing data and produces tokens and
/// webhook signatures for poking the local server with curl.
#[derive(Parser)]
#[command(name = "seed")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create demo restaurants with subscriptions in assorted states
    Data {
        #[arg(long, env = "DATABASE_URL", default_value = "sqlite://menuqr.db?mode=rwc")]
        database_url: String,
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Print a tenant bearer token for a restaurant
    Token {
        restaurant_id: Uuid,
        #[arg(long, env = "MENUQR__AUTH__JWT_SECRET", default_value = "change-me-in-production")]
        jwt_secret: String,
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// Print the x-razorpay-signature value for a payload file
    Sign {
        payload: std::path::PathBuf,
        #[arg(long, env = "MENUQR__RAZORPAY__WEBHOOK_SECRET")]
        webhook_secret: String,
    },
}

const STATES: [SubscriptionStatus; 5] = [
    SubscriptionStatus::Active,
    SubscriptionStatus::Trialing,
    SubscriptionStatus::PastDue,
    SubscriptionStatus::Halted,
    SubscriptionStatus::Cancelled,
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    match Cli::parse().command {
        Command::Data { database_url, count } => seed_data(&database_url, count).await,
        Command::Token { restaurant_id, jwt_secret, hours } => {
            let token = TokenService::new(&jwt_secret).issue("seed", restaurant_id, Duration::hours(hours))?;
            println!("{}", token);
            Ok(())
        }
        Command::Sign { payload, webhook_secret } => {
            let body = std::fs::read(&payload)?;
            println!("{}", compute_signature(&webhook_secret, &body));
            Ok(())
        }
    }
}

async fn seed_data(database_url: &str, count: usize) -> anyhow::Result<()> {
    println!("🌱 Starting database seeding...");

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let subscription_repo = SqliteSubscriptionRepository::new(db_pool.clone());
    let payment_repo = SqlitePaymentRepository::new(db_pool.clone());

    println!("🍽️  Creating restaurants...");
    let now = Utc::now();

    for i in 0..count {
        let name: String = CompanyName().fake();
        let restaurant_id = Uuid::new_v4();
        let status = STATES[i % STATES.len()];
        let plan = if i % 3 == 0 { PlanTier::Pro } else { PlanTier::Basic };

        let mut sub = Subscription::new(restaurant_id, plan, BillingInterval::Monthly);
        sub.status = status;
        sub.provider_subscription_id = Some(format!("sub_demo{:08}", i));
        sub.trial_used = true;
        match status {
            SubscriptionStatus::Trialing => {
                sub.trial_end = Some(now + Duration::days(14));
            }
            SubscriptionStatus::Cancelled => {}
            _ => {
                sub.current_period_start = Some(now - Duration::days(10));
                sub.current_period_end = Some(now + Duration::days(20));
            }
        }
        let sub = subscription_repo.create(sub).await?;

        if status != SubscriptionStatus::Trialing {
            payment_repo.upsert(PaymentUpsert {
                restaurant_id,
                subscription_id: sub.id,
                provider_payment_id: Some(format!("pay_demo{:08}", i)),
                provider_invoice_id: Some(format!("inv_demo{:08}", i)),
                amount: if plan == PlanTier::Pro { 99_900 } else { 49_900 },
                currency: "INR".to_string(),
                status: PaymentStatus::Captured,
                method: Some("upi".to_string()),
                description: Some(format!("{} plan", plan.as_str())),
                paid_at: Some(now - Duration::days(10)),
                invoice_url: None,
            }).await?;
        }

        println!(
            "  ✅ {} ({}) {} / {}",
            name,
            restaurant_id,
            status.as_str(),
            sub.provider_subscription_id.as_deref().unwrap_or("-")
        );
    }

    println!("🎉 Seeded {} restaurants", count);
    Ok(())
}

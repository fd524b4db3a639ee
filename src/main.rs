use std::sync::Arc;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use menuqr::{
    api::{self, state::AppState},
    config::Settings,
    payments::{BillingGateway, RazorpayClient},
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "menuqr=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting menuqr billing on {}:{}", settings.server.host, settings.server.port);

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    // Initialize Razorpay client if configured
    let gateway: Option<Arc<dyn BillingGateway>> = if settings.razorpay.enabled {
        match RazorpayClient::new(&settings.razorpay) {
            Ok(client) => {
                tracing::info!("Razorpay subscriptions enabled");
                Some(Arc::new(client))
            }
            Err(e) => {
                tracing::warn!("Razorpay enabled but misconfigured: {}", e);
                None
            }
        }
    } else {
        tracing::info!("Razorpay subscriptions disabled");
        None
    };

    if settings.razorpay.webhook_secret.is_none() {
        tracing::warn!("razorpay.webhook_secret is not set; webhooks will be rejected");
    }

    let service_context = Arc::new(ServiceContext::new(db_pool, gateway, &settings));
    let app = api::create_app(AppState::new(service_context, Arc::new(settings.clone())));

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}

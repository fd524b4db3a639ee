pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};

use state::AppState;

pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        // API routes
        .nest("/api/billing", billing_routes(app_state.clone()))

        // Add state to the router
        .with_state(app_state)

        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive()) // Configure properly for production
        .layer(TraceLayer::new_for_http())
}

fn billing_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Razorpay webhook (authenticated by signature, not by tenant token)
        .route("/webhook/razorpay", post(handlers::webhooks::razorpay_webhook))
        // Tenant endpoints
        .merge(Router::new()
            .route(
                "/subscription",
                get(handlers::billing::get_subscription).post(handlers::billing::subscribe),
            )
            .route("/subscription/cancel", post(handlers::billing::cancel_subscription))
            .route("/payments", get(handlers::billing::list_payments))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::auth::require_tenant,
            ))
        )
}

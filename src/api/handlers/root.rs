use axum::{http::StatusCode, Json, response::IntoResponse};
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "menuqr billing",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Subscription billing for QR menu restaurants",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "subscription": "/api/billing/subscription",
            "payments": "/api/billing/payments",
            "webhook": "/api/billing/webhook/razorpay"
        }
    }))
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

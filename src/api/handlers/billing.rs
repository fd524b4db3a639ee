use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};

use crate::{
    api::{middleware::auth::CurrentTenant, state::AppState},
    domain::{CancelSubscriptionRequest, CreateSubscriptionRequest, Payment, SubscriptionSummary},
    error::Result,
    service::SubscribeResponse,
};

pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(tenant): Extension<CurrentTenant>,
) -> Result<Json<SubscriptionSummary>> {
    let summary = state
        .service_context
        .billing_service
        .get(tenant.restaurant_id)
        .await?;
    Ok(Json(summary))
}

pub async fn subscribe(
    State(state): State<AppState>,
    Extension(tenant): Extension<CurrentTenant>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscribeResponse>)> {
    let response = state
        .service_context
        .billing_service
        .subscribe(tenant.restaurant_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(tenant): Extension<CurrentTenant>,
    request: Option<Json<CancelSubscriptionRequest>>,
) -> Result<Json<SubscriptionSummary>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let summary = state
        .service_context
        .billing_service
        .cancel(tenant.restaurant_id, request)
        .await?;
    Ok(Json(summary))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(tenant): Extension<CurrentTenant>,
) -> Result<Json<Vec<Payment>>> {
    let payments = state
        .service_context
        .billing_service
        .list_payments(tenant.restaurant_id)
        .await?;
    Ok(Json(payments))
}

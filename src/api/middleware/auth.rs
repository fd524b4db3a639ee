use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    api::state::AppState,
    error::AppError,
};

/// The restaurant a tenant-authenticated request acts for.
#[derive(Debug, Clone, Copy)]
pub struct CurrentTenant {
    pub restaurant_id: Uuid,
}

pub async fn require_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)?;

    let claims = state.service_context.token_service.verify(token)?;

    request.extensions_mut().insert(CurrentTenant {
        restaurant_id: claims.restaurant_id,
    });

    Ok(next.run(request).await)
}

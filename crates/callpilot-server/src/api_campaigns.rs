//! Campaign listing, proxied from the dialer's admin endpoint.

use crate::{dialer_err_to_response, AppState};
use axum::{extract::Extension, http::StatusCode, response::Json};
use callpilot_dialer::Campaign;
use serde_json::Value;
use std::sync::Arc;

/// GET /api/campaigns
pub async fn list_campaigns_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Campaign>>, (StatusCode, Json<Value>)> {
    let campaigns = state
        .dialer
        .list_campaigns()
        .await
        .map_err(dialer_err_to_response)?;
    Ok(Json(campaigns))
}

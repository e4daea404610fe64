//! Liveness of the coordinator and its membership store. Public.
use crate::api::error::{ApiError, api_internal};
use crate::api::types::HealthStatus;
use crate::app::AppState;
use axum::Json;
use axum::extract::State;

#[utoipa::path(
    get,
    path = "/v2/system/health",
    tag = "system",
    responses(
        (status = 200, description = "Store reachable", body = HealthStatus),
        (status = 500, description = "Store unreachable", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn system_health(
    State(state): State<AppState>,
) -> Result<Json<HealthStatus>, ApiError> {
    let store = &state.store;
    store
        .health_check()
        .await
        .map_err(|err| api_internal("membership store unavailable", &err))?;
    Ok(Json(HealthStatus {
        status: "ok".to_string(),
        backend: store.backend_name().to_string(),
        durable: store.is_durable(),
    }))
}

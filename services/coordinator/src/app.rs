//! Coordinator HTTP application wiring.
//!
//! # Purpose
//! Builds the axum router, configures middleware, and defines the shared
//! application state injected into handlers.
use crate::api;
use crate::notify::Notifier;
use crate::observability;
use crate::store::CoordinatorStore;
use axum::Router;
use axum::routing::{delete, get, patch, post};
use loop_authz::CredentialPolicy;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CoordinatorStore + Send + Sync>,
    pub notifier: Arc<dyn Notifier>,
    pub credentials: CredentialPolicy,
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            // The query string can carry one-time codes; record the path only.
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                path = %request.uri().path(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route("/v2/system/health", get(api::system::system_health))
        .route("/v2/openapi.json", get(api::openapi::openapi_json))
        .route(
            "/v2/register/basic-user",
            post(api::login::register_basic_user),
        )
        .route("/v2/login/email", post(api::login::login_email))
        .route("/v2/login/validate", get(api::login::login_validate))
        .route("/v2/logout", post(api::login::logout))
        .route(
            "/v2/chain",
            get(api::chains::get_chain)
                .post(api::chains::create_chain)
                .patch(api::chains::update_chain),
        )
        .route("/v2/chain/join", post(api::chains::join_chain))
        .route("/v2/chain/add-user", post(api::chains::add_user))
        .route("/v2/chain/remove-user", post(api::chains::remove_user))
        .route("/v2/chain/approve-user", patch(api::chains::approve_user))
        .route("/v2/chain/unapproved-user", delete(api::chains::deny_user))
        .route(
            "/v2/user",
            get(api::users::get_user).patch(api::users::update_user),
        )
        .route("/v2/user/all-chain", get(api::users::list_chain_members))
        .route("/v2/user/transfer-chain", post(api::users::transfer_chain))
        .route("/v2/user/purge", delete(api::users::purge_user))
        .layer(trace_layer)
        .with_state(state)
}

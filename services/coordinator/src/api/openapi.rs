//! OpenAPI schema aggregation for the coordinator API.
//!
//! Served as JSON at `/v2/openapi.json`.
use crate::api::{
    chains, login, system,
    types::{
        ChainAddUserRequest, ChainCreateRequest, ChainJoinRequest, ChainUpdateRequest,
        ChainUserRequest, ChainView, ErrorResponse, HealthStatus, LoginEmailRequest,
        LoginValidateResponse, MembershipView, RegisterBasicUserRequest, TransferChainRequest,
        UserUpdateRequest, UserView,
    },
    users,
};
use crate::notify::DenyReason;
use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "loop-coordinator",
        version = "v2",
        description = "Clothing loop coordination HTTP API"
    ),
    paths(
        system::system_health,
        login::register_basic_user,
        login::login_email,
        login::login_validate,
        login::logout,
        chains::create_chain,
        chains::get_chain,
        chains::update_chain,
        chains::join_chain,
        chains::add_user,
        chains::remove_user,
        chains::approve_user,
        chains::deny_user,
        users::get_user,
        users::list_chain_members,
        users::update_user,
        users::transfer_chain,
        users::purge_user
    ),
    components(schemas(
        ErrorResponse,
        HealthStatus,
        MembershipView,
        UserView,
        ChainView,
        RegisterBasicUserRequest,
        LoginEmailRequest,
        LoginValidateResponse,
        ChainCreateRequest,
        ChainUpdateRequest,
        ChainJoinRequest,
        ChainAddUserRequest,
        ChainUserRequest,
        UserUpdateRequest,
        TransferChainRequest,
        DenyReason
    )),
    tags(
        (name = "system", description = "Health"),
        (name = "login", description = "Registration and one-time code login"),
        (name = "chains", description = "Chains and chain membership"),
        (name = "users", description = "Users acting on themselves or on members")
    )
)]
pub struct ApiDoc;

pub(crate) async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

//! Chain definition endpoints

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::debug;

use crate::api::middleware::TenantContext;
use crate::api::state::AppState;
use crate::api::types::{
    ApiError, ChainListResponse, ChainResponse, CreateChainBody, ExecuteChainBody,
    ExecutionListResponse, ExecutionResponse, Json, UpdateChainBody, ValidatedJson,
};

/// POST /v1/chains
pub async fn create_chain(
    State(state): State<AppState>,
    tenant: TenantContext,
    ValidatedJson(body): ValidatedJson<CreateChainBody>,
) -> Result<(StatusCode, Json<ChainResponse>), ApiError> {
    debug!(tenant_id = %tenant.tenant_id, name = %body.name, "Creating chain");

    let chain = state
        .chain_service
        .create(&tenant.tenant_id, &tenant.user_id, body.into())
        .await?;

    Ok((StatusCode::CREATED, Json(chain.into())))
}

/// GET /v1/chains
pub async fn list_chains(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<ChainListResponse>, ApiError> {
    let chains = state.chain_service.list(&tenant.tenant_id).await?;
    Ok(Json(ChainListResponse::new(chains)))
}

/// GET /v1/chains/{chain_id}
pub async fn get_chain(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(chain_id): Path<String>,
) -> Result<Json<ChainResponse>, ApiError> {
    let chain = state.chain_service.get(&tenant.tenant_id, &chain_id).await?;
    Ok(Json(chain.into()))
}

/// PUT /v1/chains/{chain_id}
pub async fn update_chain(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(chain_id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateChainBody>,
) -> Result<Json<ChainResponse>, ApiError> {
    debug!(tenant_id = %tenant.tenant_id, chain_id = %chain_id, "Updating chain");

    let chain = state
        .chain_service
        .update(&tenant.tenant_id, &chain_id, body.into())
        .await?;

    Ok(Json(chain.into()))
}

/// DELETE /v1/chains/{chain_id}
pub async fn delete_chain(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(chain_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .chain_service
        .delete(&tenant.tenant_id, &chain_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/chains/{chain_id}/activate
pub async fn activate_chain(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(chain_id): Path<String>,
) -> Result<Json<ChainResponse>, ApiError> {
    let chain = state
        .chain_service
        .set_active(&tenant.tenant_id, &chain_id, true)
        .await?;
    Ok(Json(chain.into()))
}

/// POST /v1/chains/{chain_id}/deactivate
pub async fn deactivate_chain(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(chain_id): Path<String>,
) -> Result<Json<ChainResponse>, ApiError> {
    let chain = state
        .chain_service
        .set_active(&tenant.tenant_id, &chain_id, false)
        .await?;
    Ok(Json(chain.into()))
}

/// POST /v1/chains/{chain_id}/executions
///
/// Answers 202 with the freshly started execution; steps keep running in the background.
/// An empty body starts the chain with its default variables.
pub async fn execute_chain(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(chain_id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<ExecutionResponse>), ApiError> {
    let variables = parse_execute_body(&body)?.variables;

    debug!(
        tenant_id = %tenant.tenant_id,
        chain_id = %chain_id,
        user_id = %tenant.user_id,
        "Starting chain execution"
    );

    let execution = state
        .chain_service
        .execute(&tenant.tenant_id, &chain_id, &tenant.user_id, variables)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(execution.into())))
}

/// GET /v1/chains/{chain_id}/executions
pub async fn list_executions(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(chain_id): Path<String>,
) -> Result<Json<ExecutionListResponse>, ApiError> {
    let executions = state
        .chain_service
        .list_executions(&tenant.tenant_id, &chain_id)
        .await?;
    Ok(Json(ExecutionListResponse::new(executions)))
}

fn parse_execute_body(body: &[u8]) -> Result<ExecuteChainBody, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ExecuteChainBody::default());
    }

    serde_json::from_slice(body).map_err(|e| {
        ApiError::bad_request(format!("Invalid JSON data: {}", e)).with_code("json_parse_error")
    })
}

//! Execution lifecycle endpoints and the event stream

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{future, Stream, StreamExt};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, warn};

use crate::api::middleware::TenantContext;
use crate::api::state::AppState;
use crate::api::types::{ApiError, ExecutionResponse, Json, StepResultBody, ValidatedJson};
use crate::domain::chain::ChainEvent;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// GET /v1/executions/{execution_id}
pub async fn get_execution(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(execution_id): Path<String>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    let execution = state
        .chain_service
        .get_execution(&tenant.tenant_id, &execution_id)
        .await?;
    Ok(Json(execution.into()))
}

/// POST /v1/executions/{execution_id}/pause
pub async fn pause_execution(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(execution_id): Path<String>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    debug!(tenant_id = %tenant.tenant_id, execution_id = %execution_id, "Pausing execution");
    let execution = state
        .chain_service
        .pause(&tenant.tenant_id, &execution_id)
        .await?;
    Ok(Json(execution.into()))
}

/// POST /v1/executions/{execution_id}/resume
pub async fn resume_execution(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(execution_id): Path<String>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    debug!(tenant_id = %tenant.tenant_id, execution_id = %execution_id, "Resuming execution");
    let execution = state
        .chain_service
        .resume(&tenant.tenant_id, &execution_id)
        .await?;
    Ok(Json(execution.into()))
}

/// POST /v1/executions/{execution_id}/cancel
pub async fn cancel_execution(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(execution_id): Path<String>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    debug!(tenant_id = %tenant.tenant_id, execution_id = %execution_id, "Cancelling execution");
    let execution = state
        .chain_service
        .cancel(&tenant.tenant_id, &execution_id)
        .await?;
    Ok(Json(execution.into()))
}

/// POST /v1/executions/{execution_id}/steps/{step_id}/result
pub async fn add_step_result(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path((execution_id, step_id)): Path<(String, String)>,
    ValidatedJson(body): ValidatedJson<StepResultBody>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    let execution = state
        .chain_service
        .add_step_result(&tenant.tenant_id, &execution_id, &step_id, body.into())
        .await?;
    Ok(Json(execution.into()))
}

/// GET /v1/executions/{execution_id}/events
///
/// Server-sent events for one execution. The first event is a `status` snapshot; the
/// stream ends after a terminal lifecycle event, or right after the snapshot when the
/// execution has already finished.
pub async fn stream_events(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(execution_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Subscribe before reading the snapshot so no event falls in between
    let receiver = state.events.subscribe();
    let execution = state
        .chain_service
        .get_execution(&tenant.tenant_id, &execution_id)
        .await?;

    let finished = execution.is_terminal();
    let snapshot = status_event(&ExecutionResponse::from(execution));

    let live = BroadcastStream::new(receiver)
        .filter_map(move |item| {
            future::ready(match item {
                Ok(event)
                    if event.execution_id.as_str() == execution_id
                        && event.tenant_id.as_str() == tenant.tenant_id =>
                {
                    Some(event)
                }
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream subscriber lagged");
                    None
                }
            })
        })
        .scan(false, |done, event| {
            if *done {
                return future::ready(None);
            }
            *done = event.event.is_terminal();
            future::ready(Some(lifecycle_event(&event)))
        });

    let live = if finished {
        futures::stream::empty().left_stream()
    } else {
        live.right_stream()
    };

    let stream = futures::stream::once(future::ready(snapshot)).chain(live).map(Ok);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

fn status_event(execution: &ExecutionResponse) -> Event {
    json_event("status", execution)
}

fn lifecycle_event(event: &ChainEvent) -> Event {
    json_event(event.name(), event)
}

fn json_event<T: serde::Serialize>(name: &str, data: &T) -> Event {
    match serde_json::to_string(data) {
        Ok(json) => Event::default().event(name).data(json),
        Err(e) => {
            warn!(event = %name, error = %e, "Failed to serialize stream event");
            Event::default().event("error").data(e.to_string())
        }
    }
}

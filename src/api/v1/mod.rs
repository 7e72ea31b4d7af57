//! v1 API endpoints

pub mod chains;
pub mod executions;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/chains", post(chains::create_chain).get(chains::list_chains))
        .route(
            "/chains/{chain_id}",
            get(chains::get_chain)
                .put(chains::update_chain)
                .delete(chains::delete_chain),
        )
        .route("/chains/{chain_id}/activate", post(chains::activate_chain))
        .route("/chains/{chain_id}/deactivate", post(chains::deactivate_chain))
        .route(
            "/chains/{chain_id}/executions",
            post(chains::execute_chain).get(chains::list_executions),
        )
        .route("/executions/{execution_id}", get(executions::get_execution))
        .route(
            "/executions/{execution_id}/pause",
            post(executions::pause_execution),
        )
        .route(
            "/executions/{execution_id}/resume",
            post(executions::resume_execution),
        )
        .route(
            "/executions/{execution_id}/cancel",
            post(executions::cancel_execution),
        )
        .route(
            "/executions/{execution_id}/steps/{step_id}/result",
            post(executions::add_step_result),
        )
        .route(
            "/executions/{execution_id}/events",
            get(executions::stream_events),
        )
}

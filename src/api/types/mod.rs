//! HTTP request/response types

pub mod chain;
pub mod error;
pub mod json;

pub use chain::{
    ChainListResponse, ChainResponse, CreateChainBody, ExecuteChainBody, ExecutionListResponse,
    ExecutionResponse, StepResultBody, UpdateChainBody,
};
pub use error::{ApiError, ApiErrorResponse};
pub use json::{Json, ValidatedJson};

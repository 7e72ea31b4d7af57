//! Infrastructure layer - storage, collaborators and observability

pub mod chain;
pub mod logging;
pub mod observability;
pub mod services;
pub mod storage;

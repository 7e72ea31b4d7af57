//! Chain engine infrastructure - store, cache, invoker and event sinks

mod cache;
mod config;
mod invoker;
mod sinks;
mod store;

pub use cache::{ChainCacheConfig, MokaChainCache};
pub use config::ChainEngineConfig;
pub use invoker::{HttpInvokerConfig, HttpStepInvoker};
pub use sinks::{
    BroadcastEventSink, CompositeEventSink, LoggingEventSink, MetricsEventSink,
    WebhookEventSink, EVENT_HEADER, SIGNATURE_HEADER,
};
pub use store::{StorageChainStore, StoredChain};

//! Application configuration

mod app_config;

pub use app_config::{
    AppConfig, CacheSettings, EngineSettings, EventSettings, InvokerSettings, LogFormat,
    LoggingConfig, ServerConfig, StorageSettings,
};

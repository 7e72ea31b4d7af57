//! Event sink implementations

use std::sync::Arc;
use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::domain::chain::{ChainEvent, ChainEventKind, EventSink};
use crate::domain::DomainError;
use crate::infrastructure::observability::{record_execution_finished, record_step_invocation};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Chain-Signature";
pub const EVENT_HEADER: &str = "X-Chain-Event";

/// Writes every event to the tracing log
#[derive(Debug, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &ChainEvent) {
        info!(
            event = %event.event,
            execution_id = %event.execution_id,
            chain_id = %event.chain_id,
            tenant_id = %event.tenant_id,
            payload = %event.payload,
            "Chain event"
        );
    }
}

/// Publishes events on a tokio broadcast channel
///
/// Slow subscribers lag and lose the oldest events; the sender never blocks.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<ChainEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn sender(&self) -> broadcast::Sender<ChainEvent> {
        self.sender.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: &ChainEvent) {
        if self.sender.send(event.clone()).is_err() {
            trace!(event = %event.event, "No event subscribers");
        }
    }
}

/// POSTs each event as JSON to a fixed URL from a background task
#[derive(Debug, Clone)]
pub struct WebhookEventSink {
    client: Client,
    url: String,
    secret: Option<String>,
}

impl WebhookEventSink {
    pub fn new(url: impl Into<String>, secret: Option<String>) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DomainError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            secret,
        })
    }

    /// Hex HMAC-SHA256 of `payload` keyed by `secret`
    pub fn sign(secret: &str, payload: &str) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(payload.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    async fn deliver(&self, event: ChainEvent) {
        let body = match serde_json::to_string(&event) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to serialize chain event");
                return;
            }
        };

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header(EVENT_HEADER, event.name());

        if let Some(signature) = self.secret.as_deref().and_then(|s| Self::sign(s, &body)) {
            request = request.header(SIGNATURE_HEADER, format!("sha256={}", signature));
        }

        match request.body(body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(event = %event.event, execution_id = %event.execution_id, "Delivered chain event");
            }
            Ok(response) => warn!(
                event = %event.event,
                execution_id = %event.execution_id,
                status = response.status().as_u16(),
                "Chain event webhook rejected delivery"
            ),
            Err(e) => warn!(
                event = %event.event,
                execution_id = %event.execution_id,
                error = %e,
                "Chain event webhook delivery failed"
            ),
        }
    }
}

impl EventSink for WebhookEventSink {
    fn emit(&self, event: &ChainEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(event = %event.event, "No async runtime, dropping webhook event");
            return;
        };

        let sink = self.clone();
        let event = event.clone();
        runtime.spawn(async move { sink.deliver(event).await });
    }
}

/// Feeds the Prometheus counters from lifecycle events
#[derive(Debug, Default)]
pub struct MetricsEventSink;

impl EventSink for MetricsEventSink {
    fn emit(&self, event: &ChainEvent) {
        match event.event {
            ChainEventKind::StepCompleted | ChainEventKind::StepFailed => {
                let Some(duration_ms) = event.payload.get("duration_ms").and_then(|d| d.as_u64())
                else {
                    return;
                };
                let outcome = if event.event == ChainEventKind::StepCompleted {
                    "success"
                } else {
                    "failure"
                };
                record_step_invocation(outcome, Duration::from_millis(duration_ms));
            }
            kind if kind.is_terminal() => record_execution_finished(event.name()),
            _ => {}
        }
    }
}

/// Fans every event out to several sinks in order
#[derive(Debug, Default)]
pub struct CompositeEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for CompositeEventSink {
    fn emit(&self, event: &ChainEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

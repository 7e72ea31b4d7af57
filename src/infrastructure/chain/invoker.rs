//! Step invoker that calls a remote workflow runner over HTTP

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::domain::chain::{StepInvoker, StepOutcome};
use crate::domain::DomainError;

const INVOKER_NAME: &str = "http";

/// Connection settings for [`HttpStepInvoker`]
#[derive(Debug, Clone)]
pub struct HttpInvokerConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub api_key: Option<String>,
}

impl HttpInvokerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            api_key: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// Response body of `POST /workflows/{id}/execute`
#[derive(Debug, Deserialize)]
struct WorkflowRunResponse {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Runs each step as `POST {base_url}/workflows/{workflow_id}/execute`
///
/// A 2xx answer is mapped to a [`StepOutcome`], including runs the workflow itself
/// reported as failed. Transport errors and non-2xx statuses are returned as
/// [`DomainError::Invoker`].
#[derive(Debug, Clone)]
pub struct HttpStepInvoker {
    client: Client,
    base_url: Url,
    auth_header: Option<String>,
}

impl HttpStepInvoker {
    pub fn new(config: &HttpInvokerConfig) -> Result<Self, DomainError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            DomainError::configuration(format!(
                "Invalid workflow runner URL '{}': {}",
                config.base_url, e
            ))
        })?;

        if base_url.cannot_be_a_base() {
            return Err(DomainError::configuration(format!(
                "Workflow runner URL '{}' cannot be used as a base",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DomainError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            auth_header: config.api_key.as_ref().map(|key| format!("Bearer {}", key)),
        })
    }

    fn execute_url(&self, workflow_id: &str) -> Result<Url, DomainError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DomainError::invoker(INVOKER_NAME, "base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["workflows", workflow_id, "execute"]);
        Ok(url)
    }
}

#[async_trait]
impl StepInvoker for HttpStepInvoker {
    async fn invoke(&self, workflow_id: &str, parameters: &Value) -> Result<StepOutcome, DomainError> {
        let url = self.execute_url(workflow_id)?;
        let mut request = self.client.post(url).json(&json!({ "input": parameters }));

        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth);
        }

        debug!(workflow_id = %workflow_id, "Invoking workflow");

        let response = request.send().await.map_err(|e| {
            let message = if e.is_timeout() {
                "request timed out".to_string()
            } else if e.is_connect() {
                format!("connection failed: {}", e)
            } else {
                format!("request failed: {}", e)
            };
            DomainError::invoker(INVOKER_NAME, message)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(1000)
                .collect();
            warn!(workflow_id = %workflow_id, status = status.as_u16(), "Workflow runner returned an error status");
            return Err(DomainError::invoker(
                INVOKER_NAME,
                format!("HTTP {}: {}", status, body),
            ));
        }

        let run: WorkflowRunResponse = response.json().await.map_err(|e| {
            DomainError::invoker(INVOKER_NAME, format!("invalid response body: {}", e))
        })?;

        Ok(if run.success {
            StepOutcome::success(run.output)
        } else {
            StepOutcome::failure(
                run.error
                    .unwrap_or_else(|| format!("workflow '{}' reported failure", workflow_id)),
            )
            .with_result(run.output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn invoker(server: &MockServer) -> HttpStepInvoker {
        HttpStepInvoker::new(&HttpInvokerConfig::new(server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_successful_run() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/workflows/charge-card/execute"))
            .and(body_json(json!({ "input": { "amount": 42 } })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "output": { "charge_id": "ch_1" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let outcome = invoker(&server)
            .invoke("charge-card", &json!({ "amount": 42 }))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.result, json!({ "charge_id": "ch_1" }));
    }

    #[tokio::test]
    async fn test_reported_failure_keeps_output() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/workflows/charge-card/execute"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "output": { "code": "card_declined" },
                "error": "card declined"
            })))
            .mount(&server)
            .await;

        let outcome = invoker(&server)
            .invoke("charge-card", &json!({}))
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("card declined"));
        assert_eq!(outcome.result["code"], "card_declined");
    }

    #[tokio::test]
    async fn test_error_status_is_invoker_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("runner overloaded"))
            .mount(&server)
            .await;

        let result = invoker(&server).invoke("wf", &json!({})).await;

        match result {
            Err(DomainError::Invoker { message, .. }) => {
                assert!(message.contains("503"));
                assert!(message.contains("runner overloaded"));
            }
            other => panic!("expected invoker error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer secret-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let invoker =
            HttpStepInvoker::new(&HttpInvokerConfig::new(server.uri()).with_api_key("secret-key"))
                .unwrap();

        let outcome = invoker.invoke("wf", &json!({})).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.result, json!(1));
    }

    #[tokio::test]
    async fn test_client_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let invoker = HttpStepInvoker::new(
            &HttpInvokerConfig::new(server.uri()).with_timeout(Duration::from_millis(50)),
        )
        .unwrap();

        let result = invoker.invoke("wf", &json!({})).await;
        assert!(matches!(result, Err(DomainError::Invoker { .. })));
    }

    #[test]
    fn test_workflow_id_is_path_encoded() {
        let invoker =
            HttpStepInvoker::new(&HttpInvokerConfig::new("http://runner.local/api/")).unwrap();

        let url = invoker.execute_url("billing/charge card").unwrap();
        assert_eq!(
            url.as_str(),
            "http://runner.local/api/workflows/billing%2Fcharge%20card/execute"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = HttpStepInvoker::new(&HttpInvokerConfig::new("not a url"));
        assert!(matches!(result, Err(DomainError::Configuration { .. })));
    }
}

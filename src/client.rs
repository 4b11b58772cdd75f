//! HTTP client for the ACE-Step API
//!
//! One call per task, no retries. Every failure comes back as a failed
//! `EngineResult` rather than an error.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::protocol::{EngineResult, EngineTask};

/// Bound on `GET /models`.
pub const MODELS_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to the engine on behalf of the dispatcher.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Run one task. Transport faults are folded into the result.
    async fn process(&self, task: &EngineTask) -> EngineResult;

    /// Models the engine reports; empty when it cannot be asked.
    async fn get_models(&self) -> Vec<String>;
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    audio_path: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    models: Vec<String>,
}

/// `EngineClient` over reqwest
pub struct HttpEngineClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpEngineClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(&config.upstream_url, config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn describe_error(&self, e: &reqwest::Error) -> String {
        if e.is_timeout() {
            format!(
                "ACE-Step request timed out after {}s",
                self.timeout.as_secs_f64()
            )
        } else if e.is_connect() {
            format!("Could not connect to ACE-Step API: {}", e)
        } else {
            format!("ACE-Step client error: {}", e)
        }
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn process(&self, task: &EngineTask) -> EngineResult {
        let url = format!("{}/generate", self.base_url);
        let payload = task.to_payload();

        info!(task = %task.task_name, "Sending request to ACE-Step");
        debug!(payload = %payload, "ACE-Step request payload");

        let response = match self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let message = self.describe_error(&e);
                error!("{}", message);
                return EngineResult::failed(message);
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let message = format!("ACE-Step API error: {} - {}", status.as_u16(), body);
            error!("{}", message);
            return EngineResult::failed(message);
        }

        match response.json::<GenerateResponse>().await {
            Ok(data) => {
                info!("ACE-Step processing complete");
                EngineResult::ok(data.audio_path, data.metadata)
            }
            Err(e) => {
                let message = self.describe_error(&e);
                error!("{}", message);
                EngineResult::failed(message)
            }
        }
    }

    async fn get_models(&self) -> Vec<String> {
        let url = format!("{}/models", self.base_url);
        let result = async {
            let response = self
                .client
                .get(&url)
                .timeout(MODELS_TIMEOUT)
                .send()
                .await?
                .error_for_status()?;
            response.json::<ModelsResponse>().await
        }
        .await;

        match result {
            Ok(body) => body.models,
            Err(e) => {
                warn!(error = %e, "Could not get models from ACE-Step");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter;
    use crate::protocol::{Mode, ProcessingRequest};
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<Value>>>;

    async fn spawn_engine(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn cover_task() -> EngineTask {
        let req = ProcessingRequest::new(Mode::Cover, "/in.wav", "/out.wav")
            .with_prompt("jazz version")
            .with_intensity(0.5);
        adapter::forward(&req)
    }

    #[tokio::test]
    async fn test_process_posts_payload() {
        let captured: Captured = Arc::default();
        let router = Router::new()
            .route(
                "/generate",
                post(|State(seen): State<Captured>, Json(body): Json<Value>| async move {
                    seen.lock().unwrap().push(body);
                    Json(json!({"audio_path": "/engine/out.wav", "metadata": {"seed": 7}}))
                }),
            )
            .with_state(captured.clone());
        let base = spawn_engine(router).await;

        let client = HttpEngineClient::new(&base, Duration::from_secs(5));
        let result = client.process(&cover_task()).await;

        assert!(result.success);
        assert_eq!(result.audio_path.as_deref(), Some("/engine/out.wav"));
        assert_eq!(result.metadata["seed"], 7);

        let body = captured.lock().unwrap()[0].clone();
        assert_eq!(body["task"], "cover");
        assert_eq!(body["guidance_scale"], 9.0);
        assert_eq!(body["preserve_melody"], true);
        assert_eq!(body["audio_path"], "/in.wav");
    }

    #[tokio::test]
    async fn test_non_200_becomes_failed_result() {
        let router = Router::new().route(
            "/generate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
        );
        let base = spawn_engine(router).await;

        let result = HttpEngineClient::new(&base, Duration::from_secs(5))
            .process(&cover_task())
            .await;

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("ACE-Step API error: 500 - model not loaded")
        );
    }

    #[tokio::test]
    async fn test_timeout_becomes_failed_result() {
        let router = Router::new().route(
            "/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        );
        let base = spawn_engine(router).await;

        let result = HttpEngineClient::new(&base, Duration::from_millis(200))
            .process(&cover_task())
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("ACE-Step request timed out after"));
    }

    #[tokio::test]
    async fn test_connection_refused_becomes_failed_result() {
        let result = HttpEngineClient::new("http://127.0.0.1:9", Duration::from_secs(2))
            .process(&cover_task())
            .await;

        assert!(!result.success);
        assert!(result
            .error
            .unwrap()
            .starts_with("Could not connect to ACE-Step API"));
    }

    #[tokio::test]
    async fn test_malformed_body_becomes_failed_result() {
        let router = Router::new().route("/generate", post(|| async { "not json" }));
        let base = spawn_engine(router).await;

        let result = HttpEngineClient::new(&base, Duration::from_secs(5))
            .process(&cover_task())
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("ACE-Step client error"));
    }

    #[tokio::test]
    async fn test_get_models() {
        let router = Router::new().route(
            "/models",
            get(|| async { Json(json!({"models": ["acestep-v15-turbo"]})) }),
        );
        let base = spawn_engine(router).await;

        let client = HttpEngineClient::new(&format!("{}/", base), Duration::from_secs(5));
        assert_eq!(client.get_models().await, vec!["acestep-v15-turbo"]);

        let down = HttpEngineClient::new("http://127.0.0.1:9", Duration::from_secs(5));
        assert!(down.get_models().await.is_empty());
    }
}

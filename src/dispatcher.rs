//! Request dispatcher
//!
//! validate -> ensure_running -> forward -> engine call -> backward.
//! Validation and availability failures come back as `Err` before the
//! engine is touched; an engine failure is an `Ok` response with
//! `success == false`.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::adapter;
use crate::client::EngineClient;
use crate::error::{BridgeError, ErrorKind, Result};
use crate::protocol::{ProcessingRequest, ProcessingResponse};
use crate::supervisor::Supervisor;

/// Whether `input_path` has to exist on the bridge host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputCheck {
    /// HTTP callers: the file must be readable here.
    MustExist,
    /// Line-protocol callers: the engine resolves the path.
    Skip,
}

#[derive(Clone)]
pub struct Dispatcher {
    supervisor: Supervisor,
    client: Arc<dyn EngineClient>,
}

impl Dispatcher {
    pub fn new(supervisor: Supervisor, client: Arc<dyn EngineClient>) -> Self {
        Self { supervisor, client }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn client(&self) -> &Arc<dyn EngineClient> {
        &self.client
    }

    /// Run one processing request end to end.
    pub async fn process(
        &self,
        request: &ProcessingRequest,
        input_check: InputCheck,
    ) -> Result<ProcessingResponse> {
        let result = self.dispatch(request, input_check).await;
        if let Err(e) = &result {
            match e.kind() {
                ErrorKind::Internal => {
                    error!(error = %e, mode = %request.mode, input = %request.input_path, "internal error while dispatching")
                }
                _ => warn!(code = e.error_code(), error = %e, "request rejected"),
            }
        }
        result
    }

    async fn dispatch(
        &self,
        request: &ProcessingRequest,
        input_check: InputCheck,
    ) -> Result<ProcessingResponse> {
        request.validate()?;
        if input_check == InputCheck::MustExist {
            check_input_exists(&request.input_path).await?;
        }

        if !self.supervisor.ensure_running().await {
            return Err(BridgeError::ServiceUnavailable {
                reason: self.unavailable_reason(),
            });
        }

        let task = adapter::forward(request);
        info!(mode = %request.mode, task = %task.task_name, guidance = task.guidance_scale, "dispatching to ACE-Step");

        let started = Instant::now();
        let result = self.client.process(&task).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let response = adapter::backward(result, request, elapsed_ms);
        if response.success {
            info!(elapsed_ms, output = ?response.output_path, "processing complete");
        } else {
            warn!(elapsed_ms, error = ?response.error_message, "ACE-Step reported failure");
        }
        Ok(response)
    }

    /// Why `ensure_running` said no. A start failure only explains it when
    /// this request could have triggered a start.
    fn unavailable_reason(&self) -> String {
        let unreachable = format!("not reachable at {}", self.supervisor.upstream_url());
        if !self.supervisor.auto_start() {
            return format!("{} and auto-start is disabled", unreachable);
        }
        self.supervisor.last_error().unwrap_or(unreachable)
    }
}

async fn check_input_exists(input_path: &str) -> Result<()> {
    let path = Path::new(input_path);
    if tokio::fs::try_exists(path).await? {
        Ok(())
    } else {
        Err(BridgeError::InputNotFound {
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::protocol::{EngineResult, EngineTask};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Engine client that records calls and returns a canned result.
    pub struct StubClient {
        pub calls: AtomicUsize,
        pub tasks: Mutex<Vec<EngineTask>>,
        pub result: EngineResult,
    }

    impl StubClient {
        pub fn returning(result: EngineResult) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                tasks: Mutex::new(Vec::new()),
                result,
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EngineClient for StubClient {
        async fn process(&self, task: &EngineTask) -> EngineResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.tasks.lock().unwrap().push(task.clone());
            self.result.clone()
        }

        async fn get_models(&self) -> Vec<String> {
            vec!["acestep-v15-turbo".to_string()]
        }
    }
}

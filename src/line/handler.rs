//! Line protocol action handler
//!
//! Turns one `LineRequest` into one `LineResponse`. Never fails: every
//! problem becomes an error response carrying the caller's `request_id`.

use serde_json::{Map, Value};
use tracing::{debug, error, info};

use crate::adapter;
use crate::dispatcher::{Dispatcher, InputCheck};
use crate::error::{BridgeError, ErrorKind};
use crate::models::{ModelCatalog, ModelInfo};
use crate::protocol::{
    error_codes, Action, LineRequest, LineResponse, Mode, NeuralChanges, ProcessingRequest,
};

pub struct LineHandler {
    dispatcher: Dispatcher,
    catalog: ModelCatalog,
}

impl LineHandler {
    pub fn new(dispatcher: Dispatcher, catalog: ModelCatalog) -> Self {
        Self {
            dispatcher,
            catalog,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn handle(&self, request: LineRequest) -> LineResponse {
        let action = match Action::parse(&request.action) {
            Some(action) => action,
            None => {
                return LineResponse::error(
                    request.request_id,
                    error_codes::UNKNOWN_ACTION,
                    format!("Unknown action: {}", request.action),
                )
            }
        };
        debug!(%action, request_id = ?request.request_id, "handling line request");

        match action {
            Action::Ping => LineResponse::message(request.request_id, "pong"),
            Action::ListModels => self.list_models(request),
            Action::GetModelInfo => self.get_model_info(request),
            Action::Process => self.process(request).await,
            // Requests are handled one at a time, so there is never
            // anything in flight to cancel by the time this is read.
            Action::Abort => LineResponse::message(request.request_id, "Abort requested"),
        }
    }

    fn list_models(&self, request: LineRequest) -> LineResponse {
        match serde_json::to_string(&self.catalog.list_models()) {
            Ok(ids) => LineResponse::message(request.request_id, ids),
            Err(e) => internal(request.request_id, e.into()),
        }
    }

    fn get_model_info(&self, request: LineRequest) -> LineResponse {
        let info = match self.lookup_model(&request) {
            Ok(info) => info,
            Err(response) => return response,
        };
        match serde_json::to_string(info) {
            Ok(json) => LineResponse::message(request.request_id, json),
            Err(e) => internal(request.request_id, e.into()),
        }
    }

    fn lookup_model(&self, request: &LineRequest) -> Result<&ModelInfo, LineResponse> {
        let model = request.model.as_deref().unwrap_or_default();
        self.catalog.get(model).map_err(|e| {
            LineResponse::error(
                request.request_id.clone(),
                error_codes::MODEL_NOT_FOUND,
                e.to_string(),
            )
        })
    }

    async fn process(&self, request: LineRequest) -> LineResponse {
        let model_id = match self.lookup_model(&request) {
            Ok(info) => info.id.clone(),
            Err(response) => return response,
        };
        let request_id = request.request_id.clone();

        let processing = match build_processing_request(&request) {
            Ok(processing) => processing,
            Err(e) => return LineResponse::error(request_id, line_error_code(&e), e.to_string()),
        };
        if !request.context.is_empty() {
            debug!(keys = ?request.context.keys().collect::<Vec<_>>(), "ignoring host context");
        }

        let response = match self
            .dispatcher
            .process(&processing, InputCheck::Skip)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return LineResponse::error(request_id, line_error_code(&e), e.public_message())
            }
        };

        if !response.success {
            return LineResponse::error(
                request_id,
                error_codes::PROCESSING_ERROR,
                response
                    .error_message
                    .unwrap_or_else(|| response.description.clone()),
            );
        }

        info!(model = %model_id, mode = %processing.mode, elapsed_ms = response.processing_time_ms, "line process complete");
        LineResponse {
            success: true,
            request_id,
            tool_used: Some("neural".to_string()),
            reasoning: Some(reasoning(&processing)),
            message: Some(response.description),
            neural_changes: Some(NeuralChanges {
                model: model_id,
                output_path: response.output_path,
                processing_time_ms: response.processing_time_ms,
                intentional_artifacts: response.intentional_artifacts,
                warnings: response.warnings,
            }),
            error: None,
            error_code: None,
        }
    }
}

/// `model_params` plus the envelope's paths and prompt.
fn build_processing_request(request: &LineRequest) -> Result<ProcessingRequest, BridgeError> {
    let input_path = required(&request.input_path, "input_path")?;
    let output_path = required(&request.output_path, "output_path")?;

    let mut fields: Map<String, Value> = request.model_params.clone();
    fields
        .entry("mode")
        .or_insert_with(|| Value::from(Mode::default().as_str()));
    fields.insert("input_path".into(), Value::from(input_path));
    fields.insert("output_path".into(), Value::from(output_path));
    if let Some(prompt) = &request.prompt {
        fields.insert("prompt".into(), Value::from(prompt.as_str()));
    }

    serde_json::from_value(Value::Object(fields))
        .map_err(|e| BridgeError::invalid("model_params", e.to_string()))
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, BridgeError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(BridgeError::missing(name)),
    }
}

fn reasoning(request: &ProcessingRequest) -> String {
    format!(
        "ACE-Step {} ({}) at intensity {:.2}, guidance scale {:.1}",
        request.mode,
        request.mode.description(),
        request.intensity,
        adapter::guidance_scale(request.intensity)
    )
}

fn line_error_code(err: &BridgeError) -> &'static str {
    match err {
        BridgeError::MissingParameter { .. } => error_codes::MISSING_PARAMETER,
        BridgeError::ModelNotFound { .. } => error_codes::MODEL_NOT_FOUND,
        _ => match err.kind() {
            ErrorKind::Validation => error_codes::INVALID_PARAMETER,
            ErrorKind::ServiceUnavailable => error_codes::SERVICE_UNAVAILABLE,
            ErrorKind::Engine => error_codes::PROCESSING_ERROR,
            ErrorKind::Internal => error_codes::INTERNAL_ERROR,
        },
    }
}

fn internal(request_id: Option<Value>, err: BridgeError) -> LineResponse {
    error!(error = %err, "internal error in line handler");
    LineResponse::error(request_id, error_codes::INTERNAL_ERROR, err.public_message())
}

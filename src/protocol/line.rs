//! Line protocol envelopes
//!
//! One JSON object per line in each direction. `request_id` is echoed
//! verbatim so callers can correlate responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Error codes carried in `LineResponse::error_code`.
pub mod error_codes {
    pub const UNKNOWN_ACTION: &str = "UNKNOWN_ACTION";
    pub const MODEL_NOT_FOUND: &str = "MODEL_NOT_FOUND";
    pub const MISSING_PARAMETER: &str = "MISSING_PARAMETER";
    pub const INVALID_PARAMETER: &str = "INVALID_PARAMETER";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
    pub const PROCESSING_ERROR: &str = "PROCESSING_ERROR";
    pub const INVALID_JSON: &str = "INVALID_JSON";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Ping,
    Process,
    ListModels,
    GetModelInfo,
    Abort,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ping" => Some(Self::Ping),
            "process" => Some(Self::Process),
            "list_models" => Some(Self::ListModels),
            "get_model_info" => Some(Self::GetModelInfo),
            "abort" => Some(Self::Abort),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ping => "ping",
            Self::Process => "process",
            Self::ListModels => "list_models",
            Self::GetModelInfo => "get_model_info",
            Self::Abort => "abort",
        };
        f.write_str(name)
    }
}

fn default_action() -> String {
    "ping".to_string()
}

/// Request from the host over the line protocol.
///
/// `action` stays a string here so an unknown action can still be
/// answered with its `request_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineRequest {
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub request_id: Option<Value>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub input_path: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub model_params: Map<String, Value>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

/// What the neural step changed, reported on a successful `process`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralChanges {
    pub model: String,
    pub output_path: Option<String>,
    pub processing_time_ms: u64,
    pub intentional_artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Response to the host over the line protocol
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,
    /// "dsp", "neural", "both", "none"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neural_changes: Option<NeuralChanges>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl LineResponse {
    pub fn message(request_id: Option<Value>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            request_id,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn error(request_id: Option<Value>, code: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            request_id,
            error: Some(error.into()),
            error_code: Some(code.to_string()),
            ..Default::default()
        }
    }
}

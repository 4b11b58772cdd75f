//! Host-facing request and response shapes
//!
//! These are the bodies of `POST /process` and the payload the line
//! protocol builds from `model_params`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::mode::Mode;
use crate::error::{BridgeError, Result};

/// Open parameter bag. Passed through to the engine unchecked.
pub type ExtraParams = HashMap<String, serde_json::Value>;

fn default_intensity() -> f64 {
    0.7
}

fn default_true() -> bool {
    true
}

/// Request from the Nueva host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRequest {
    /// Processing mode
    pub mode: Mode,

    /// Path to input audio file
    #[serde(default)]
    pub input_path: String,

    /// Path for output audio file
    #[serde(default)]
    pub output_path: String,

    /// Text prompt for generation/transformation
    #[serde(default)]
    pub prompt: Option<String>,

    /// Transformation intensity, 0..=1
    #[serde(default = "default_intensity")]
    pub intensity: f64,

    #[serde(default = "default_true")]
    pub preserve_melody: bool,
    #[serde(default = "default_true")]
    pub preserve_tempo: bool,
    #[serde(default = "default_true")]
    pub preserve_key: bool,

    /// What to extract: vocals, drums, bass, other, all (extract mode)
    #[serde(default)]
    pub extract_target: Option<String>,

    /// Instruments to add (layer mode)
    #[serde(default)]
    pub add_layers: Option<Vec<String>>,

    /// Instruments to remove (layer mode)
    #[serde(default)]
    pub remove_layers: Option<Vec<String>>,

    /// Target duration for generation
    #[serde(default)]
    pub duration_seconds: Option<f64>,

    /// Random seed for reproducibility
    #[serde(default)]
    pub seed: Option<i64>,

    /// Merged into the engine kwargs last, so any key here wins over the
    /// mode-specific kwargs. This can silently defeat e.g. `preserve_melody`.
    #[serde(default)]
    pub extra_params: ExtraParams,
}

impl ProcessingRequest {
    pub fn new(mode: Mode, input_path: impl Into<String>, output_path: impl Into<String>) -> Self {
        Self {
            mode,
            input_path: input_path.into(),
            output_path: output_path.into(),
            prompt: None,
            intensity: default_intensity(),
            preserve_melody: true,
            preserve_tempo: true,
            preserve_key: true,
            extract_target: None,
            add_layers: None,
            remove_layers: None,
            duration_seconds: None,
            seed: None,
            extra_params: ExtraParams::new(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_intensity(mut self, intensity: f64) -> Self {
        self.intensity = intensity;
        self
    }

    /// Field-level checks that need no I/O.
    pub fn validate(&self) -> Result<()> {
        if self.input_path.trim().is_empty() {
            return Err(BridgeError::missing("input_path"));
        }
        if self.output_path.trim().is_empty() {
            return Err(BridgeError::missing("output_path"));
        }
        if !(0.0..=1.0).contains(&self.intensity) {
            return Err(BridgeError::invalid(
                "intensity",
                format!("{} is not between 0.0 and 1.0", self.intensity),
            ));
        }
        if let Some(duration) = self.duration_seconds {
            if !(duration > 0.0 && duration.is_finite()) {
                return Err(BridgeError::invalid(
                    "duration_seconds",
                    format!("{} must be a positive number of seconds", duration),
                ));
            }
        }
        Ok(())
    }
}

/// Response to the Nueva host
///
/// `error_code`/`error_message` are present exactly when `success` is false;
/// use the constructors to keep that true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,

    pub processing_time_ms: u64,

    /// Human-readable description of what was done
    pub description: String,

    /// Advisory tags for context tracking
    #[serde(default)]
    pub intentional_artifacts: Vec<String>,

    #[serde(default)]
    pub warnings: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ProcessingResponse {
    pub fn success(output_path: String, description: String, time_ms: u64) -> Self {
        Self {
            success: true,
            output_path: Some(output_path),
            processing_time_ms: time_ms,
            description,
            intentional_artifacts: Vec::new(),
            warnings: Vec::new(),
            error_code: None,
            error_message: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failure(
        error_code: &str,
        error_message: String,
        description: String,
        time_ms: u64,
    ) -> Self {
        Self {
            success: false,
            output_path: None,
            processing_time_ms: time_ms,
            description,
            intentional_artifacts: Vec::new(),
            warnings: Vec::new(),
            error_code: Some(error_code.to_string()),
            error_message: Some(error_message),
            metadata: HashMap::new(),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.intentional_artifacts = artifacts;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

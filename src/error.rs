//! Error handling for the Nueva bridge
//!
//! Every layer below the dispatcher returns tagged results; `BridgeError`
//! is what crosses the dispatcher boundary. Each error carries a stable
//! code and recovery suggestions for the host.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Coarse classification used by the transports to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing request fields. Never reaches the engine.
    Validation,
    /// The engine could not be brought healthy.
    ServiceUnavailable,
    /// The engine ran but failed, or talking to it failed.
    Engine,
    /// Unexpected fault inside the bridge.
    Internal,
}

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    // Validation Errors
    #[error("{param} is required")]
    MissingParameter { param: String },

    #[error("Invalid parameter '{param}': {reason}")]
    InvalidParameter { param: String, reason: String },

    #[error("Input file not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    // Availability Errors
    #[error("ACE-Step API is not available: {reason}")]
    ServiceUnavailable { reason: String },

    // Engine Errors
    #[error("ACE-Step processing failed: {reason}")]
    Engine { reason: String },

    // Internal Errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BridgeError {
    pub fn missing(param: &str) -> Self {
        Self::MissingParameter {
            param: param.to_string(),
        }
    }

    pub fn invalid(param: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.to_string(),
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            BridgeError::MissingParameter { .. } => "MISSING_PARAMETER",
            BridgeError::InvalidParameter { .. } => "INVALID_PARAMETER",
            BridgeError::InputNotFound { .. } => "INPUT_NOT_FOUND",
            BridgeError::ModelNotFound { .. } => "MODEL_NOT_FOUND",
            BridgeError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            BridgeError::Engine { .. } => "ENGINE_ERROR",
            BridgeError::Internal(_) => "INTERNAL_ERROR",
            BridgeError::Io(_) => "INTERNAL_ERROR",
            BridgeError::Serialization(_) => "INTERNAL_ERROR",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::MissingParameter { .. }
            | BridgeError::InvalidParameter { .. }
            | BridgeError::InputNotFound { .. }
            | BridgeError::ModelNotFound { .. } => ErrorKind::Validation,
            BridgeError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            BridgeError::Engine { .. } => ErrorKind::Engine,
            BridgeError::Internal(_) | BridgeError::Io(_) | BridgeError::Serialization(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Returns true if the host may retry the same request unchanged.
    ///
    /// The bridge itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::ServiceUnavailable { .. } | BridgeError::Engine { .. }
        )
    }

    /// Message safe to hand to a caller. Internal details stay in the log.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal bridge error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            BridgeError::MissingParameter { .. } | BridgeError::InvalidParameter { .. } => vec![
                "Check the request against the bridge schema",
                "intensity must be between 0.0 and 1.0",
            ],
            BridgeError::InputNotFound { .. } => vec![
                "Check the input path is correct",
                "Paths are resolved on the bridge host, not the caller",
                "Use /process/upload to send the file instead",
            ],
            BridgeError::ModelNotFound { .. } => vec![
                "Use list_models to see installed models",
                "Available models: ace-step",
            ],
            BridgeError::ServiceUnavailable { .. } => vec![
                "Ensure ACE-Step is installed (NUEVA_ACE_STEP_PATH)",
                "Start it manually with: uv run acestep-api",
                "Enable auto-start with NUEVA_ACESTEP_AUTO_START=true",
            ],
            BridgeError::Engine { .. } => vec![
                "Try again; ACE-Step output is non-deterministic",
                "Raise NUEVA_ACESTEP_TIMEOUT_MS if the model is still loading",
                "Reduce audio length and try again",
            ],
            _ => vec![],
        }
    }
}

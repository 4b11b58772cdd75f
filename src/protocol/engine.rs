//! Engine-native task and result shapes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Diffusion steps sent when the caller does not override them.
pub const DEFAULT_INFERENCE_STEPS: u32 = 50;

/// Request to the ACE-Step API.
///
/// Only built by `adapter::forward`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineTask {
    pub task_name: String,
    pub audio_path: Option<String>,
    pub prompt: Option<String>,
    /// Classifier-free guidance scale
    pub guidance_scale: f64,
    pub inference_steps: u32,
    /// Target duration in seconds
    pub duration: Option<f64>,
    /// Additional parameters passed through
    pub kwargs: Map<String, Value>,
}

impl EngineTask {
    /// JSON body for `POST /generate`.
    ///
    /// kwargs are spread after the fixed keys and may replace them.
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("task".into(), Value::from(self.task_name.clone()));
        payload.insert(
            "prompt".into(),
            self.prompt.clone().map(Value::from).unwrap_or(Value::Null),
        );
        payload.insert("guidance_scale".into(), Value::from(self.guidance_scale));
        payload.insert("num_inference_steps".into(), Value::from(self.inference_steps));
        payload.extend(self.kwargs.clone());

        if let Some(audio_path) = &self.audio_path {
            payload.insert("audio_path".into(), Value::from(audio_path.clone()));
        }
        if let Some(duration) = self.duration {
            payload.insert("audio_duration".into(), Value::from(duration));
        }
        Value::Object(payload)
    }
}

/// Response from the ACE-Step API
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineResult {
    pub success: bool,
    #[serde(default)]
    pub audio_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl EngineResult {
    pub fn ok(audio_path: Option<String>, metadata: HashMap<String, Value>) -> Self {
        Self {
            success: true,
            audio_path,
            error: None,
            metadata,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            audio_path: None,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task() -> EngineTask {
        EngineTask {
            task_name: "cover".into(),
            audio_path: Some("in.wav".into()),
            prompt: Some("jazz".into()),
            guidance_scale: 9.0,
            inference_steps: DEFAULT_INFERENCE_STEPS,
            duration: None,
            kwargs: Map::new(),
        }
    }

    #[test]
    fn test_payload_shape() {
        let payload = task().to_payload();
        assert_eq!(payload["task"], "cover");
        assert_eq!(payload["prompt"], "jazz");
        assert_eq!(payload["guidance_scale"], 9.0);
        assert_eq!(payload["num_inference_steps"], 50);
        assert_eq!(payload["audio_path"], "in.wav");
        assert!(payload.get("audio_duration").is_none());
    }

    #[test]
    fn test_payload_kwargs_spread_and_override() {
        let mut t = task();
        t.duration = Some(12.5);
        t.kwargs.insert("seed".into(), json!(42));
        t.kwargs.insert("num_inference_steps".into(), json!(8));

        let payload = t.to_payload();
        assert_eq!(payload["seed"], 42);
        assert_eq!(payload["num_inference_steps"], 8);
        assert_eq!(payload["audio_duration"], 12.5);
    }

    #[test]
    fn test_result_constructors() {
        let failed = EngineResult::failed("timeout");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("timeout"));

        let ok = EngineResult::ok(None, HashMap::new());
        assert!(ok.success && ok.error.is_none());
    }
}

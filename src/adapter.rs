//! Translation between host-semantic requests and the ACE-Step vocabulary
//!
//! `forward` maps a `ProcessingRequest` onto an `EngineTask`; `backward`
//! turns the engine's answer into the host-facing response, adding the
//! description and advisory artifact tags the engine does not produce.
//!
//! Both directions are pure: no I/O, no clock.

use serde_json::{Map, Value};

use crate::error::BridgeError;
use crate::protocol::{
    EngineResult, EngineTask, Mode, ProcessingRequest, ProcessingResponse,
    DEFAULT_INFERENCE_STEPS,
};

/// Guidance scale at intensity 0.
pub const MIN_GUIDANCE_SCALE: f64 = 3.0;
/// Guidance scale at intensity 1.
pub const MAX_GUIDANCE_SCALE: f64 = 15.0;

/// Genres whose mention in a cover prompt marks a genre transformation.
const COVER_GENRES: [&str; 4] = ["jazz", "rock", "classical", "electronic"];

/// Payload keys the engine client writes itself.
const FIXED_PAYLOAD_KEYS: [&str; 6] = [
    "task",
    "prompt",
    "guidance_scale",
    "num_inference_steps",
    "audio_path",
    "audio_duration",
];

/// Advisory artifact tags reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// Cover mode timbre change - completely new instrumental character
    CoverTimbre,
    /// Different timbre (e.g., cover version)
    DifferentTimbre,
    /// Genre transformation - intentional genre change
    GenreTransformation,
    /// Intentional coloration
    IntentionalColoration,
    /// Frequency rolloff (e.g., vintage sound)
    FrequencyRolloff,
    /// Vocal extraction artifacts
    VocalExtractionArtifacts,
    /// Instrument layer artifacts
    LayerArtifacts,
    /// Bitcrushing artifacts
    Bitcrushing,
    /// General noise
    Noise,
    /// Sample rate artifacts
    SampleRateArtifacts,
    /// High frequency noise (e.g., vinyl crackle)
    HighFrequencyNoise,
    /// Subtle crackle
    SubtleCrackle,
    /// Subtle hiss (e.g., tape)
    SubtleHiss,
    /// Saturation/distortion
    Saturation,
    /// Bit-depth quantization (8-bit, chiptune)
    Quantization,
    /// Limited polyphony (chiptune)
    LimitedPolyphony,
}

impl Artifact {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoverTimbre => "cover_timbre",
            Self::DifferentTimbre => "different_timbre",
            Self::GenreTransformation => "genre_transformation",
            Self::IntentionalColoration => "intentional_coloration",
            Self::FrequencyRolloff => "frequency_rolloff",
            Self::VocalExtractionArtifacts => "vocal_extraction_artifacts",
            Self::LayerArtifacts => "layer_artifacts",
            Self::Bitcrushing => "bitcrushing",
            Self::Noise => "noise",
            Self::SampleRateArtifacts => "sample_rate_artifacts",
            Self::HighFrequencyNoise => "high_frequency_noise",
            Self::SubtleCrackle => "subtle_crackle",
            Self::SubtleHiss => "subtle_hiss",
            Self::Saturation => "saturation",
            Self::Quantization => "quantization",
            Self::LimitedPolyphony => "limited_polyphony",
        }
    }
}

/// Map intensity 0..=1 onto the engine's guidance range 3..=15.
///
/// Callers rely on this being exactly `3 + intensity * 12`.
pub fn guidance_scale(intensity: f64) -> f64 {
    MIN_GUIDANCE_SCALE + intensity * (MAX_GUIDANCE_SCALE - MIN_GUIDANCE_SCALE)
}

/// Kwargs derived from the mode-specific fields, before `extra_params`.
fn mode_kwargs(request: &ProcessingRequest) -> Map<String, Value> {
    let mut kwargs = Map::new();

    match request.mode {
        Mode::Cover => {
            kwargs.insert("preserve_melody".into(), Value::Bool(request.preserve_melody));
            kwargs.insert("preserve_tempo".into(), Value::Bool(request.preserve_tempo));
            kwargs.insert("preserve_key".into(), Value::Bool(request.preserve_key));
        }
        Mode::Extract => {
            if let Some(target) = &request.extract_target {
                kwargs.insert("target".into(), Value::from(target.clone()));
            }
        }
        Mode::Layer => {
            if let Some(add) = request.add_layers.as_ref().filter(|l| !l.is_empty()) {
                kwargs.insert("add_instruments".into(), Value::from(add.clone()));
            }
            if let Some(remove) = request.remove_layers.as_ref().filter(|l| !l.is_empty()) {
                kwargs.insert("remove_instruments".into(), Value::from(remove.clone()));
            }
        }
        Mode::Transform | Mode::Repaint | Mode::Complete => {}
    }

    if let Some(seed) = request.seed {
        kwargs.insert("seed".into(), Value::from(seed));
    }

    kwargs
}

/// Build the engine task for a request.
pub fn forward(request: &ProcessingRequest) -> EngineTask {
    let mut kwargs = mode_kwargs(request);

    // Caller escape hatch: extra_params wins over everything computed above.
    for (key, value) in &request.extra_params {
        kwargs.insert(key.clone(), value.clone());
    }

    EngineTask {
        task_name: request.mode.task_name().to_string(),
        audio_path: Some(request.input_path.clone()).filter(|p| !p.is_empty()),
        prompt: request.prompt.clone(),
        guidance_scale: guidance_scale(request.intensity),
        inference_steps: DEFAULT_INFERENCE_STEPS,
        duration: request.duration_seconds,
        kwargs,
    }
}

/// Non-fatal notes about a request: overridden kwargs and fields the
/// chosen mode ignores.
pub fn advisory_warnings(request: &ProcessingRequest) -> Vec<String> {
    let mut warnings = Vec::new();
    let computed = mode_kwargs(request);

    let mut overridden: Vec<&String> = request
        .extra_params
        .keys()
        .filter(|key| computed.contains_key(*key) || FIXED_PAYLOAD_KEYS.contains(&key.as_str()))
        .collect();
    overridden.sort();
    for key in overridden {
        warnings.push(format!(
            "extra_params.{} overrides the value derived from the request",
            key
        ));
    }

    if request.mode != Mode::Cover
        && !(request.preserve_melody && request.preserve_tempo && request.preserve_key)
    {
        warnings.push(format!(
            "preserve_melody/tempo/key only apply to cover mode, ignored for {}",
            request.mode
        ));
    }
    if request.mode != Mode::Extract && request.extract_target.is_some() {
        warnings.push(format!(
            "extract_target only applies to extract mode, ignored for {}",
            request.mode
        ));
    }
    let has_layers = request.add_layers.as_ref().is_some_and(|l| !l.is_empty())
        || request.remove_layers.as_ref().is_some_and(|l| !l.is_empty());
    if request.mode != Mode::Layer && has_layers {
        warnings.push(format!(
            "add_layers/remove_layers only apply to layer mode, ignored for {}",
            request.mode
        ));
    }

    warnings
}

/// Advisory artifact tags for a successful run.
///
/// Heuristic only: never used to decide success.
pub fn artifacts_for(mode: Mode, prompt: Option<&str>) -> Vec<Artifact> {
    let prompt_lower = prompt.map(str::to_lowercase).unwrap_or_default();
    let mentions = |needle: &str| prompt_lower.contains(needle);
    let mut artifacts = Vec::new();

    match mode {
        Mode::Cover => {
            artifacts.push(Artifact::CoverTimbre);
            artifacts.push(Artifact::DifferentTimbre);
            if COVER_GENRES.iter().any(|genre| mentions(genre)) {
                artifacts.push(Artifact::GenreTransformation);
            }
        }
        Mode::Transform => {
            artifacts.push(Artifact::IntentionalColoration);
            if mentions("vintage") {
                artifacts.push(Artifact::FrequencyRolloff);
            }
        }
        Mode::Extract => artifacts.push(Artifact::VocalExtractionArtifacts),
        Mode::Layer => artifacts.push(Artifact::LayerArtifacts),
        Mode::Repaint | Mode::Complete => {}
    }

    if mentions("lo-fi") || mentions("lofi") {
        artifacts.extend([
            Artifact::Bitcrushing,
            Artifact::Noise,
            Artifact::SampleRateArtifacts,
        ]);
    }
    if mentions("vinyl") {
        artifacts.extend([Artifact::HighFrequencyNoise, Artifact::SubtleCrackle]);
    }
    if mentions("tape") {
        artifacts.extend([Artifact::SubtleHiss, Artifact::Saturation]);
    }
    if mentions("8-bit") || mentions("chiptune") {
        artifacts.extend([Artifact::Quantization, Artifact::LimitedPolyphony]);
    }

    let mut unique = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        if !unique.contains(&artifact) {
            unique.push(artifact);
        }
    }
    unique
}

/// Build the host response from the engine result.
pub fn backward(
    result: EngineResult,
    original: &ProcessingRequest,
    elapsed_ms: u64,
) -> ProcessingResponse {
    if !result.success {
        let reason = result
            .error
            .unwrap_or_else(|| "unknown engine error".to_string());
        let error = BridgeError::Engine {
            reason: reason.clone(),
        };
        return ProcessingResponse::failure(
            error.error_code(),
            reason,
            error.to_string(),
            elapsed_ms,
        );
    }

    let mut description = original.mode.result_phrase().to_string();
    if let Some(prompt) = &original.prompt {
        description.push_str(&format!(": '{}'", prompt));
    }

    let artifacts = artifacts_for(original.mode, original.prompt.as_deref())
        .iter()
        .map(|a| a.as_str().to_string())
        .collect();

    ProcessingResponse::success(
        result
            .audio_path
            .unwrap_or_else(|| original.output_path.clone()),
        description,
        elapsed_ms,
    )
    .with_artifacts(artifacts)
    .with_warnings(advisory_warnings(original))
    .with_metadata(result.metadata)
}

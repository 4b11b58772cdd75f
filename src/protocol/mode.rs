//! Host-semantic processing modes and their engine task names

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// ACE-Step processing modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Generate music from text prompt (text2music)
    Transform,
    /// Create a cover version - change style, preserve structure
    Cover,
    /// Repaint/modify specific audio regions
    Repaint,
    /// Source separation / extraction
    Extract,
    /// Add/remove instrument layers (lego mode)
    Layer,
    /// Add accompaniment / complete
    Complete,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::Transform,
        Mode::Cover,
        Mode::Repaint,
        Mode::Extract,
        Mode::Layer,
        Mode::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::Cover => "cover",
            Self::Repaint => "repaint",
            Self::Extract => "extract",
            Self::Layer => "layer",
            Self::Complete => "complete",
        }
    }

    /// Engine-native task identifier.
    pub fn task_name(&self) -> &'static str {
        match self {
            Self::Transform => "text2music",
            Self::Cover => "cover",
            Self::Repaint => "repaint",
            Self::Extract => "extract",
            Self::Layer => "lego",
            Self::Complete => "complete",
        }
    }

    /// Fixed phrase used to describe a successful run.
    pub fn result_phrase(&self) -> &'static str {
        match self {
            Self::Transform => "Generated music from prompt",
            Self::Cover => "Created cover version",
            Self::Repaint => "Repainted audio region",
            Self::Extract => "Extracted audio sources",
            Self::Layer => "Modified instrument layers",
            Self::Complete => "Added accompaniment",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Transform => "Generate music from text description",
            Self::Cover => "Create a cover version with different style",
            Self::Repaint => "Modify specific regions of audio",
            Self::Extract => "Separate audio sources (vocals, drums, etc.)",
            Self::Layer => "Add or remove instrument layers",
            Self::Complete => "Add accompaniment to existing audio",
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Self::Transform
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized mode string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mode '{0}', expected transform, cover, repaint, extract, layer, or complete")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transform" | "text2music" => Ok(Self::Transform),
            "cover" => Ok(Self::Cover),
            "repaint" => Ok(Self::Repaint),
            "extract" | "separation" => Ok(Self::Extract),
            "layer" | "lego" => Ok(Self::Layer),
            "complete" | "accompaniment" => Ok(Self::Complete),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Mode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

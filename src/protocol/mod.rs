//! Schema layer shared by both transports
//!
//! - `mode`: host-semantic modes and the engine task table
//! - `request`: `ProcessingRequest` / `ProcessingResponse`
//! - `engine`: `EngineTask` / `EngineResult`
//! - `line`: line protocol envelopes

pub mod engine;
pub mod line;
pub mod mode;
pub mod request;

pub use engine::{EngineResult, EngineTask, DEFAULT_INFERENCE_STEPS};
pub use line::{error_codes, Action, LineRequest, LineResponse, NeuralChanges};
pub use mode::{Mode, UnknownMode};
pub use request::{ExtraParams, ProcessingRequest, ProcessingResponse};

//! Nueva AI Bridge
//!
//! Sits between the Nueva host and the ACE-Step neural engine:
//!
//! - the host speaks either a line protocol (stdin/stdout) or HTTP;
//! - both front-ends share one schema (`protocol`) and one dispatcher;
//! - the dispatcher validates, makes sure the engine is up through the
//!   `supervisor`, translates with the `adapter`, and calls the engine
//!   through the `client`.

pub mod adapter;
pub mod cli;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod line;
pub mod models;
pub mod protocol;
pub mod server;
pub mod supervisor;

pub use client::{EngineClient, HttpEngineClient};
pub use config::BridgeConfig;
pub use dispatcher::{Dispatcher, InputCheck};
pub use error::{BridgeError, ErrorKind, Result};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorState};

//! Line protocol front-end
//!
//! One JSON request per line on stdin, one JSON response per line on
//! stdout. Logs never go to stdout.

pub mod handler;
pub mod server;
pub mod transport;

pub use handler::LineHandler;
pub use server::LineServer;
pub use transport::{Inbound, LineTransport};

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::models::ModelCatalog;

/// Serve the line protocol on the process's stdin/stdout until EOF.
pub async fn serve_stdio(dispatcher: Dispatcher) -> Result<()> {
    let handler = LineHandler::new(dispatcher, ModelCatalog::with_defaults());
    let transport = LineTransport::new(tokio::io::stdin(), tokio::io::stdout());
    LineServer::new(transport, handler).run().await
}

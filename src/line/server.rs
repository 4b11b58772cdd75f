//! Line protocol server loop

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::line::handler::LineHandler;
use crate::line::transport::{Inbound, LineTransport};
use crate::protocol::{error_codes, LineRequest, LineResponse};

/// Reads requests, answers each in order, stops at EOF.
pub struct LineServer<R, W> {
    transport: LineTransport<R, W>,
    handler: LineHandler,
}

impl<R, W> LineServer<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(transport: LineTransport<R, W>, handler: LineHandler) -> Self {
        Self { transport, handler }
    }

    pub fn handler(&self) -> &LineHandler {
        &self.handler
    }

    /// Serve until the input closes. Only I/O errors on the streams end it
    /// early; a bad line gets an error response and the loop goes on.
    pub async fn run(&mut self) -> Result<()> {
        info!("line protocol server ready");

        loop {
            let line = match self.transport.read_line().await? {
                Some(Inbound::Line(line)) if line.is_empty() => continue,
                Some(Inbound::Line(line)) => line,
                Some(Inbound::Rejected(reason)) => {
                    let response = LineResponse::error(
                        None,
                        error_codes::INVALID_JSON,
                        format!("Invalid JSON: {}", reason),
                    );
                    self.write_response(&response).await?;
                    continue;
                }
                None => {
                    info!("input closed, shutting down");
                    return Ok(());
                }
            };

            let response = match parse_request(&line) {
                Ok(request) => self.handler.handle(request).await,
                Err(response) => response,
            };
            self.write_response(&response).await?;
        }
    }

    async fn write_response(&mut self, response: &LineResponse) -> Result<()> {
        let json = match serde_json::to_string(response) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "failed to serialize response");
                let fallback = LineResponse::error(
                    response.request_id.clone(),
                    error_codes::INTERNAL_ERROR,
                    "Internal bridge error",
                );
                serde_json::to_string(&fallback)?
            }
        };
        self.transport.write_line(&json).await
    }

    pub fn into_transport(self) -> LineTransport<R, W> {
        self.transport
    }
}

/// Parse one line into a request, or the error response to send instead.
fn parse_request(line: &str) -> std::result::Result<LineRequest, LineResponse> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        warn!(error = %e, "invalid JSON on line protocol");
        LineResponse::error(None, error_codes::INVALID_JSON, format!("Invalid JSON: {}", e))
    })?;

    // Keep the id of a well-formed object even if its fields are wrong.
    let request_id = value.get("request_id").cloned();
    serde_json::from_value::<LineRequest>(value)
        .map(|request| {
            debug!(action = %request.action, "received request");
            request
        })
        .map_err(|e| {
            warn!(error = %e, "malformed line request");
            LineResponse::error(
                request_id,
                error_codes::INVALID_JSON,
                format!("Invalid request: {}", e),
            )
        })
}

//! Message transport to the companion process.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dripsync_common::Result;

/// Methods the companion understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    /// Ask for the current data payload.
    GetInfo,
}

/// A single request envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id, echoed back in the response.
    pub id: Uuid,
    pub method: Command,
}

impl Request {
    /// Create a request for `method` with a fresh id.
    pub fn new(method: Command) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
        }
    }

    /// Request for the current data payload.
    pub fn get_info() -> Self {
        Self::new(Command::GetInfo)
    }
}

/// A single response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    /// Raw payload, itself a JSON document. Empty if the companion sent
    /// none.
    #[serde(default)]
    pub result: String,
}

impl Response {
    /// Answer `request` with `result`.
    pub fn reply(request: &Request, result: impl Into<String>) -> Self {
        Self {
            id: request.id,
            result: result.into(),
        }
    }
}

/// Request/response channel to the companion process.
///
/// The channel may drop at any time. Implementations report the link state
/// through `is_connected` and fail requests they cannot deliver with
/// `Error::TransportDisconnected`. Timeouts are imposed by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the transport name (e.g., "loopback", "ble").
    fn name(&self) -> &str;

    /// Open the channel.
    ///
    /// # Errors
    /// - `TransportDisconnected` if the companion is unreachable
    async fn connect(&self) -> Result<()>;

    /// Close the channel. Outstanding requests may still complete or fail.
    async fn disconnect(&self) -> Result<()>;

    /// Whether a request issued now has a chance of being delivered.
    fn is_connected(&self) -> bool;

    /// Send one request and wait for its response.
    ///
    /// # Errors
    /// - `TransportDisconnected` if the link is down
    /// - `Transport` for delivery failures
    async fn request(&self, request: Request) -> Result<Response>;
}

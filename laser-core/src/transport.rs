//! Seams between the engine and the device server.
//!
//! The console binary implements these over HTTP (`reqwest`) and WebSocket
//! (`tokio-tungstenite`); the devkit provides recording mocks.

use crate::commands::CommandRequest;
use crate::error::TransportError;
use crate::models::DeviceRecord;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Inbound text frames of one stream connection. The stream ending means the
/// remote side closed the connection.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Device collection used to seed a session.
    async fn discover(&self) -> Result<Vec<DeviceRecord>, TransportError>;

    /// Issues one control request; the response body is not interpreted.
    async fn send(&self, request: &CommandRequest) -> Result<(), TransportError>;
}

#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self) -> Result<MessageStream, TransportError>;
}

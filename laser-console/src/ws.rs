//! Connexion WebSocket au stream du device-server.

use async_trait::async_trait;
use futures::StreamExt;
use laser_core::{MessageStream, StreamConnector, TransportError};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};

pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: &str) -> Self {
        Self { url: url.to_string() }
    }
}

#[async_trait]
impl StreamConnector for WsConnector {
    async fn connect(&self) -> Result<MessageStream, TransportError> {
        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!("[console] stream connected to {}", self.url);

        // seuls les messages texte portent des enveloppes ; ping/pong gérés par tungstenite
        let frames = ws_stream.filter_map(|frame| async move {
            match frame {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bin)) => match String::from_utf8(bin.to_vec()) {
                    Ok(text) => Some(Ok(text)),
                    Err(e) => {
                        warn!("[console] non-utf8 binary frame dropped: {}", e);
                        None
                    }
                },
                Ok(Message::Close(frame)) => {
                    debug!("[console] close frame received: {:?}", frame);
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::Stream(e.to_string()))),
            }
        });
        Ok(Box::pin(frames))
    }
}

/*!
Mock du stream WebSocket pour développement sans device-server

Chaque `connect()` ouvre un nouveau canal; le test pousse des messages texte
(ou des erreurs transport) qui arrivent à la pompe comme depuis le réseau.
*/

use async_trait::async_trait;
use laser_core::{MessageStream, StreamConnector, TransportError};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use anyhow::Result;

type Frame = Result<String, TransportError>;

#[derive(Clone, Default)]
pub struct MockStreamConnector {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<Frame>>>>,
    refuse: Arc<AtomicBool>,
    connects: Arc<AtomicUsize>,
}

impl MockStreamConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Les prochaines connexions sont refusées
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// true tant que la pompe écoute la connexion courante
    pub fn is_connected(&self) -> bool {
        self.sender
            .lock()
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }

    /// Simule la réception d'un message texte
    pub fn push<S: Into<String>>(&self, text: S) -> Result<()> {
        self.send(Ok(text.into()))
    }

    pub fn push_json(&self, message: &Value) -> Result<()> {
        self.push(message.to_string())
    }

    /// Simule une erreur transport (la pompe considère la connexion perdue)
    pub fn fail_stream<S: Into<String>>(&self, message: S) -> Result<()> {
        self.send(Err(TransportError::Stream(message.into())))
    }

    /// Simule la fermeture côté serveur
    pub fn close_remote(&self) {
        self.sender.lock().take();
        log::info!("🔌 [MOCK] stream closed by remote");
    }

    fn send(&self, frame: Frame) -> Result<()> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            anyhow::bail!("no open stream connection");
        };
        sender
            .send(frame)
            .map_err(|e| anyhow::anyhow!("Send error: {}", e))
    }
}

#[async_trait]
impl StreamConnector for MockStreamConnector {
    async fn connect(&self) -> Result<MessageStream, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            log::info!("🚫 [MOCK] stream connection refused");
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.lock() = Some(tx);
        log::info!("📡 [MOCK] stream connected");

        let frames = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });
        Ok(Box::pin(frames))
    }
}

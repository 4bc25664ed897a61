//! Session lifecycle - discovery, stream, safe shutdown.
//!
//! A `Session` is an explicit object handed to its collaborators; several can
//! coexist in tests, each with its own registry.

use crate::commands::{CommandDispatcher, CommandOutcome};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::registry::{DeviceRegistry, RegistryEvent};
use crate::state::{new_state, Shared};
use crate::stream::{StreamIngestor, StreamState};
use crate::transport::{DeviceApi, StreamConnector};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Stopped,
    Running,
}

pub struct Session {
    api: Arc<dyn DeviceApi>,
    registry: Shared<DeviceRegistry>,
    dispatcher: CommandDispatcher,
    stream: StreamIngestor,
    state: SessionState,
}

impl Session {
    pub fn new(
        api: Arc<dyn DeviceApi>,
        connector: Arc<dyn StreamConnector>,
        config: &SessionConfig,
    ) -> Self {
        let registry = new_state(DeviceRegistry::from_config(config));
        let dispatcher = CommandDispatcher::new(api.clone(), registry.clone());
        let stream = StreamIngestor::new(registry.clone(), connector, config.reconnect.policy());

        Self {
            api,
            registry,
            dispatcher,
            stream,
            state: SessionState::Stopped,
        }
    }

    /// Discovers the devices, seeds the registry and opens the stream.
    /// Calling it on a running session does nothing.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Running {
            debug!("[session] already running");
            return Ok(());
        }

        info!("[session] starting, discovering devices");
        let records = self.api.discover().await.map_err(|e| {
            error!("[session] discovery failed: {}", e);
            SessionError::Discovery(e)
        })?;

        let count = records.len();
        self.registry.lock().seed(records);
        self.stream.open().await;
        self.state = SessionState::Running;

        info!("[session] running with {} devices (stream {:?})", count, self.stream.state());
        Ok(())
    }

    /// Puts every device in a safe state, then closes the stream and empties
    /// the registry. Shutdown commands go out while the stream is still open.
    pub async fn stop(&mut self) -> Vec<CommandOutcome> {
        let serials = self.registry.lock().serials();
        if self.state == SessionState::Stopped {
            debug!("[session] stop on a stopped session");
        } else {
            info!("[session] stopping, shutting down {} devices", serials.len());
        }

        let mut outcomes = Vec::new();
        for serial in &serials {
            let handle = self.dispatcher.shutdown_device(serial);
            outcomes.extend(handle.outcome().await);
        }

        let failures = outcomes.iter().filter(|o| !o.is_ok()).count();
        if failures > 0 {
            warn!("[session] {} shutdown command(s) failed", failures);
        }

        self.stream.close().await;
        self.registry.lock().clear();
        self.state = SessionState::Stopped;
        info!("[session] stopped");
        outcomes
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn registry(&self) -> Shared<DeviceRegistry> {
        self.registry.clone()
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn stream_state(&self) -> StreamState {
        self.stream.state()
    }

    pub fn watch_stream_state(&self) -> watch::Receiver<StreamState> {
        self.stream.watch_state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.registry.lock().subscribe()
    }
}

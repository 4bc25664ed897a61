//! Stream ingestion - pushes from the device server into the registry.
//!
//! Connection lifecycle is an explicit state machine
//! (`Closed -> Connecting -> Open -> Closed`) published on a `watch` channel.
//! Malformed or unexpected messages are logged and dropped; nothing arriving
//! on the stream can take the session down.

use crate::models::{Envelope, Flags, Signal};
use crate::reconnect::ReconnectPolicy;
use crate::registry::DeviceRegistry;
use crate::state::Shared;
use crate::transport::{MessageStream, StreamConnector};
use futures::StreamExt;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Closed,
    Connecting,
    Open,
}

/// What a single message did to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    Signals { applied: usize, dropped: usize },
    Flags { applied: usize, dropped: usize },
    Unrecognized(String),
    Malformed,
}

/// Parses one envelope and merges it into the registry.
pub fn ingest(registry: &mut DeviceRegistry, text: &str) -> Ingested {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("[stream] malformed message dropped: {}", e);
            return Ingested::Malformed;
        }
    };

    let data = envelope.data.unwrap_or_default();
    match envelope.kind.as_str() {
        "signals" => ingest_signals(registry, data),
        "flags" => ingest_flags(registry, data),
        other => {
            error!("[stream] unrecognized message type `{}`", other);
            Ingested::Unrecognized(other.to_string())
        }
    }
}

fn ingest_signals(registry: &mut DeviceRegistry, data: Map<String, Value>) -> Ingested {
    let (mut applied, mut dropped) = (0, 0);

    for (serial, payload) in data {
        let Value::Object(samples) = payload else {
            warn!("[stream] signals for {} is not an object, dropped", serial);
            dropped += 1;
            continue;
        };
        if !registry.contains(&serial) {
            warn!("[stream] signals for unknown device {}, dropped", serial);
            dropped += samples.len();
            continue;
        }

        for (name, value) in samples {
            let signal = match name.parse::<Signal>() {
                Ok(signal) => signal,
                Err(e) => {
                    warn!("[stream] {}: {}", serial, e);
                    dropped += 1;
                    continue;
                }
            };
            let Some(value) = value.as_f64() else {
                warn!("[stream] {}.{} is not a number: {}", serial, signal, value);
                dropped += 1;
                continue;
            };

            if registry.apply_signal_sample(&serial, signal, value) {
                applied += 1;
            } else {
                dropped += 1;
            }
        }
    }

    Ingested::Signals { applied, dropped }
}

fn ingest_flags(registry: &mut DeviceRegistry, data: Map<String, Value>) -> Ingested {
    let (mut applied, mut dropped) = (0, 0);

    for (serial, payload) in data {
        match serde_json::from_value::<Flags>(payload) {
            Ok(flags) if registry.apply_flags(&serial, flags) => applied += 1,
            Ok(_) => dropped += 1,
            Err(e) => {
                warn!("[stream] invalid flags for {}: {}", serial, e);
                dropped += 1;
            }
        }
    }

    Ingested::Flags { applied, dropped }
}

struct Pump {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Ce dont la pompe a besoin, cloné dans la tâche
#[derive(Clone)]
struct PumpContext {
    registry: Shared<DeviceRegistry>,
    connector: Arc<dyn StreamConnector>,
    policy: Arc<dyn ReconnectPolicy>,
    state: Arc<watch::Sender<StreamState>>,
}

impl PumpContext {
    fn set_state(&self, state: StreamState) {
        self.state.send_replace(state);
    }
}

pub struct StreamIngestor {
    ctx: PumpContext,
    pump: Option<Pump>,
}

impl StreamIngestor {
    pub fn new(
        registry: Shared<DeviceRegistry>,
        connector: Arc<dyn StreamConnector>,
        policy: Arc<dyn ReconnectPolicy>,
    ) -> Self {
        let (state, _) = watch::channel(StreamState::Closed);
        Self {
            ctx: PumpContext {
                registry,
                connector,
                policy,
                state: Arc::new(state),
            },
            pump: None,
        }
    }

    pub fn state(&self) -> StreamState {
        *self.ctx.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<StreamState> {
        self.ctx.state.subscribe()
    }

    /// Connects and starts pumping messages. A failed connection is logged
    /// and leaves the stream `Closed`.
    pub async fn open(&mut self) {
        if self.pump.is_some() {
            // une pompe existe encore (éventuellement terminée) : on repart de zéro
            self.close().await;
        }

        self.ctx.set_state(StreamState::Connecting);
        let stream = match self.ctx.connector.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("[stream] failed to open stream: {}", e);
                self.ctx.set_state(StreamState::Closed);
                return;
            }
        };

        self.ctx.set_state(StreamState::Open);
        info!("[stream] connected");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_pump(stream, self.ctx.clone(), cancel.clone()));
        self.pump = Some(Pump { cancel, task });
    }

    /// Stops the pump (and any pending reconnection). Idempotent.
    pub async fn close(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.cancel.cancel();
            if let Err(e) = pump.task.await {
                warn!("[stream] pump task ended abnormally: {}", e);
            }
            info!("[stream] closed");
        }
        self.ctx.set_state(StreamState::Closed);
    }
}

impl Drop for StreamIngestor {
    fn drop(&mut self) {
        if let Some(pump) = &self.pump {
            pump.cancel.cancel();
        }
    }
}

async fn run_pump(mut stream: MessageStream, ctx: PumpContext, cancel: CancellationToken) {
    loop {
        if !read_until_closed(&mut stream, &ctx, &cancel).await {
            return;
        }
        ctx.set_state(StreamState::Closed);

        match reconnect(&ctx, &cancel).await {
            Some(next) => stream = next,
            None => return,
        }
    }
}

/// Returns `false` when cancelled, `true` when the connection was lost.
async fn read_until_closed(stream: &mut MessageStream, ctx: &PumpContext, cancel: &CancellationToken) -> bool {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            frame = stream.next() => match frame {
                Some(Ok(text)) => {
                    let outcome = ingest(&mut ctx.registry.lock(), &text);
                    debug!("[stream] {:?}", outcome);
                }
                Some(Err(e)) => {
                    error!("[stream] transport error: {}", e);
                    return true;
                }
                None => {
                    warn!("[stream] connection closed by device server");
                    return true;
                }
            }
        }
    }
}

async fn reconnect(ctx: &PumpContext, cancel: &CancellationToken) -> Option<MessageStream> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let Some(delay) = ctx.policy.next_delay(attempt) else {
            info!("[stream] no reconnection (policy {:?}), stream stays closed", ctx.policy);
            return None;
        };

        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        ctx.set_state(StreamState::Connecting);
        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = ctx.connector.connect() => result,
        };

        match result {
            Ok(stream) => {
                info!("[stream] reconnected after {} attempt(s)", attempt);
                ctx.set_state(StreamState::Open);
                return Some(stream);
            }
            Err(e) => {
                warn!("[stream] reconnection attempt {} failed: {}", attempt, e);
                ctx.set_state(StreamState::Closed);
            }
        }
    }
}

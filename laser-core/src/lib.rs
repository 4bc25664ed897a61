//! Laser Core - device-state synchronization engine for the laser console
//!
//! Mirrors the state of a small fleet of laser heads served by a device server:
//! - Authoritative registry of device metadata, safety flags and signal histories
//! - Ingestion of streamed `signals` / `flags` envelopes (partial, possibly stale)
//! - Command dispatch with safety ordering (remote authority before disable)
//! - Session lifecycle with safe shutdown sequencing
//!
//! Transports are injected through the [`DeviceApi`] and [`StreamConnector`]
//! traits so a session can be driven by HTTP/WebSocket in production and by
//! mocks in tests.

pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod reconnect;
pub mod registry;
pub mod session;
pub mod state;
pub mod stream;
pub mod transport;

pub use commands::{Command, CommandDispatcher, CommandHandle, CommandOutcome, CommandRequest, CommandValue};
pub use config::{ReconnectConf, SessionConfig};
pub use error::{CommandError, SessionError, TransportError, UnknownSignal};
pub use history::{HistoryBuffer, HISTORY_CAPACITY};
pub use models::{DeviceRecord, Envelope, Flags, HeadInfo, Signal};
pub use reconnect::{FixedBackoff, NoReconnect, ReconnectPolicy};
pub use registry::{Device, DeviceField, DeviceRegistry, RegistryEvent};
pub use session::{Session, SessionState};
pub use state::{new_state, Shared};
pub use stream::{ingest, Ingested, StreamIngestor, StreamState};
pub use transport::{DeviceApi, MessageStream, StreamConnector};

//! Command dispatch - control requests against a laser head.
//!
//! Every request runs on its own spawned task; the caller receives a
//! [`CommandHandle`] it may await for the outcomes or simply drop. Effects are
//! never written to the registry: they become visible only once the device
//! reports them through a later stream push.

use crate::error::CommandError;
use crate::models::Flags;
use crate::registry::DeviceRegistry;
use crate::state::Shared;
use crate::transport::DeviceApi;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Enable,
    Disable,
    Remote,
    Power,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Enable => "enable",
            Command::Disable => "disable",
            Command::Remote => "remote",
            Command::Power => "power",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandValue {
    Bool(bool),
    Number(f64),
}

impl fmt::Display for CommandValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandValue::Bool(v) => write!(f, "{v}"),
            CommandValue::Number(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub id: Uuid,
    pub serial: String,
    pub command: Command,
    pub value: Option<CommandValue>,
}

impl CommandRequest {
    pub fn new(serial: &str, command: Command, value: Option<CommandValue>) -> Self {
        Self {
            id: Uuid::new_v4(),
            serial: serial.to_string(),
            command,
            value,
        }
    }
}

impl fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}({}, {})", self.command, self.serial, value),
            None => write!(f, "{}({})", self.command, self.serial),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub request: CommandRequest,
    pub result: Result<(), CommandError>,
}

impl CommandOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Pending result of one or more ordered requests.
///
/// Dropping the handle detaches the task: requests still go out, their
/// failures are still logged.
#[must_use = "await `outcome()` or call `detach()` to discard the result explicitly"]
pub struct CommandHandle {
    requests: Vec<CommandRequest>,
    task: Option<JoinHandle<Vec<CommandOutcome>>>,
}

impl CommandHandle {
    /// Handle for a composite that decided to issue nothing.
    pub fn none() -> Self {
        Self {
            requests: Vec::new(),
            task: None,
        }
    }

    fn spawn<F>(requests: Vec<CommandRequest>, future: F) -> Self
    where
        F: Future<Output = Vec<CommandOutcome>> + Send + 'static,
    {
        Self {
            requests,
            task: Some(tokio::spawn(future)),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.task.is_none()
    }

    /// Requests in issue order.
    pub fn requests(&self) -> &[CommandRequest] {
        &self.requests
    }

    /// One outcome per issued request, in issue order.
    pub async fn outcome(self) -> Vec<CommandOutcome> {
        let Some(task) = self.task else {
            return Vec::new();
        };

        match task.await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                error!("[commands] command task failed: {}", e);
                self.requests
                    .into_iter()
                    .map(|request| CommandOutcome {
                        request,
                        result: Err(CommandError::Aborted(e.to_string())),
                    })
                    .collect()
            }
        }
    }

    pub fn detach(self) {}
}

#[derive(Clone)]
pub struct CommandDispatcher {
    api: Arc<dyn DeviceApi>,
    registry: Shared<DeviceRegistry>,
}

impl CommandDispatcher {
    pub fn new(api: Arc<dyn DeviceApi>, registry: Shared<DeviceRegistry>) -> Self {
        Self { api, registry }
    }

    /// Issues a single request. Must be called from within a tokio runtime.
    pub fn send_command(&self, serial: &str, command: Command, value: Option<CommandValue>) -> CommandHandle {
        self.issue(vec![CommandRequest::new(serial, command, value)])
    }

    pub fn enable(&self, serial: &str) -> CommandHandle {
        self.send_command(serial, Command::Enable, None)
    }

    /// Disabling requires remote authority: `remote(true)` goes first when the
    /// device does not have it. Nothing is sent if the software switch is
    /// already off.
    pub fn disable(&self, serial: &str) -> CommandHandle {
        let Some(flags) = self.flags_of(serial) else {
            return CommandHandle::none();
        };
        if !flags.software_switch {
            debug!("[commands] {} already disabled, nothing to send", serial);
            return CommandHandle::none();
        }

        let mut requests = Vec::with_capacity(2);
        if !flags.remote_control {
            requests.push(CommandRequest::new(serial, Command::Remote, Some(CommandValue::Bool(true))));
        }
        requests.push(CommandRequest::new(serial, Command::Disable, None));
        self.issue(requests)
    }

    pub fn toggle_remote_control(&self, serial: &str) -> CommandHandle {
        let Some(flags) = self.flags_of(serial) else {
            return CommandHandle::none();
        };
        self.send_command(serial, Command::Remote, Some(CommandValue::Bool(!flags.remote_control)))
    }

    /// No clamping here: callers bound `value` to `[0, power_limit]`.
    pub fn set_power(&self, serial: &str, value: f64) -> CommandHandle {
        self.send_command(serial, Command::Power, Some(CommandValue::Number(value)))
    }

    /// Local configuration only, no hardware command.
    pub fn set_power_limit(&self, value: f64) {
        self.registry.lock().set_power_limit(value);
    }

    /// Safe shutdown of one head: remote authority if missing, power to zero,
    /// then disable. Each step is attempted even if an earlier one failed.
    pub fn shutdown_device(&self, serial: &str) -> CommandHandle {
        let Some(flags) = self.flags_of(serial) else {
            return CommandHandle::none();
        };

        let mut requests = Vec::with_capacity(3);
        if !flags.remote_control {
            requests.push(CommandRequest::new(serial, Command::Remote, Some(CommandValue::Bool(true))));
        }
        requests.push(CommandRequest::new(serial, Command::Power, Some(CommandValue::Number(0.0))));
        requests.push(CommandRequest::new(serial, Command::Disable, None));
        self.issue(requests)
    }

    fn flags_of(&self, serial: &str) -> Option<Flags> {
        let registry = self.registry.lock();
        match registry.get(serial) {
            Some(device) => Some(device.flags),
            None => {
                warn!("[commands] unknown device {}, command skipped", serial);
                None
            }
        }
    }

    fn issue(&self, requests: Vec<CommandRequest>) -> CommandHandle {
        let api = self.api.clone();
        let queued = requests.clone();

        CommandHandle::spawn(requests, async move {
            let mut outcomes = Vec::with_capacity(queued.len());
            // séquentiel mais pas atomique : un échec n'arrête pas la suite
            for request in queued {
                let result = api.send(&request).await.map_err(CommandError::from);
                match &result {
                    Ok(()) => info!("[commands] sent {} ({})", request, request.id),
                    Err(e) => warn!("[commands] {} ({}) failed: {}", request, request.id, e),
                }
                outcomes.push(CommandOutcome { request, result });
            }
            outcomes
        })
    }
}

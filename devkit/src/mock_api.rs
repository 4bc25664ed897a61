/*!
Mock du device-server pour tests sans matériel

Sert une liste de lasers à la découverte et enregistre toutes les commandes
envoyées, dans l'ordre, pour les assertions. Les échecs (découverte ou
commande) peuvent être simulés.
*/

use async_trait::async_trait;
use laser_core::{Command, CommandRequest, CommandValue, DeviceApi, DeviceRecord, TransportError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Forme compacte d'une commande envoyée: (serial, commande, valeur)
pub type SentCommand = (String, Command, Option<CommandValue>);

#[derive(Clone, Default)]
pub struct MockDeviceApi {
    devices: Arc<Mutex<Vec<DeviceRecord>>>,
    sent: Arc<Mutex<Vec<CommandRequest>>>,
    discovery_error: Arc<Mutex<Option<String>>>,
    failing_commands: Arc<Mutex<HashSet<Command>>>,
    discover_calls: Arc<AtomicUsize>,
}

impl MockDeviceApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<DeviceRecord>) -> Self {
        let api = Self::new();
        api.set_devices(devices);
        api
    }

    /// Remplace la réponse de découverte
    pub fn set_devices(&self, devices: Vec<DeviceRecord>) {
        *self.devices.lock() = devices;
    }

    /// Les prochaines découvertes échouent avec ce message
    pub fn fail_discovery<S: Into<String>>(&self, message: S) {
        *self.discovery_error.lock() = Some(message.into());
    }

    /// Ce type de commande répondra 500 (elle est quand même enregistrée)
    pub fn fail_command(&self, command: Command) {
        self.failing_commands.lock().insert(command);
    }

    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    /// Toutes les requêtes reçues, dans l'ordre d'arrivée
    pub fn sent_requests(&self) -> Vec<CommandRequest> {
        self.sent.lock().clone()
    }

    pub fn sent_commands(&self) -> Vec<SentCommand> {
        self.sent
            .lock()
            .iter()
            .map(|r| (r.serial.clone(), r.command, r.value))
            .collect()
    }

    pub fn sent_for(&self, serial: &str) -> Vec<SentCommand> {
        self.sent_commands()
            .into_iter()
            .filter(|(s, _, _)| s == serial)
            .collect()
    }

    /// Reset des commandes enregistrées
    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl DeviceApi for MockDeviceApi {
    async fn discover(&self) -> Result<Vec<DeviceRecord>, TransportError> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.discovery_error.lock().clone() {
            log::info!("🔍 [MOCK] discovery failing: {}", message);
            return Err(TransportError::Http(message));
        }
        let devices = self.devices.lock().clone();
        log::info!("🔍 [MOCK] discovery returned {} devices", devices.len());
        Ok(devices)
    }

    async fn send(&self, request: &CommandRequest) -> Result<(), TransportError> {
        self.sent.lock().push(request.clone());
        log::info!("📤 [MOCK] {}", request);

        if self.failing_commands.lock().contains(&request.command) {
            return Err(TransportError::Status {
                status: 500,
                url: format!("mock://{}/{}", request.serial, request.command),
            });
        }
        Ok(())
    }
}

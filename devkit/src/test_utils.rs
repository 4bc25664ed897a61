/*!
Test Harness pour la console laser

Facilite l'écriture de tests de session avec:
- Setup automatique du mock device-server et du mock stream
- Injection de messages et attente de leur application
- Assertions sur les commandes envoyées
*/

use crate::mock_api::{MockDeviceApi, SentCommand};
use crate::mock_stream::MockStreamConnector;
use laser_core::{DeviceRecord, DeviceRegistry, Flags, Session, SessionConfig, Signal};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;

/// Harness de test complet: session réelle, transports simulés
pub struct TestHarness {
    pub api: MockDeviceApi,
    pub stream: MockStreamConnector,
    pub session: Session,
}

impl TestHarness {
    /// Crée un harness sans laser découvert
    pub fn new() -> Self {
        Self::with_devices(Vec::new())
    }

    pub fn with_devices(devices: Vec<DeviceRecord>) -> Self {
        Self::with_config(devices, SessionConfig::default())
    }

    pub fn with_config(devices: Vec<DeviceRecord>, config: SessionConfig) -> Self {
        env_logger::try_init().ok(); // Init logging pour tests

        let api = MockDeviceApi::with_devices(devices);
        let stream = MockStreamConnector::new();
        let session = Session::new(Arc::new(api.clone()), Arc::new(stream.clone()), &config);

        Self { api, stream, session }
    }

    pub async fn start(&mut self) -> Result<()> {
        self.session.start().await?;
        log::info!("🚀 Session started");
        Ok(())
    }

    /// Simule la réception d'une enveloppe sur le stream
    pub fn push(&self, envelope: &Value) -> Result<()> {
        self.stream.push_json(envelope)
    }

    /// Attend qu'une condition sur le registry devienne vraie
    pub async fn wait_for<F>(&self, timeout_ms: u64, condition: F) -> Result<()>
    where
        F: Fn(&DeviceRegistry) -> bool,
    {
        let start = std::time::Instant::now();
        let registry = self.session.registry();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if condition(&registry.lock()) {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        log::warn!("⏰ Timeout waiting for registry condition");
        anyhow::bail!("condition not met within {}ms", timeout_ms);
    }

    /// Attend que `serial.signal` contienne `len` échantillons
    pub async fn wait_for_history_len(&self, serial: &str, signal: Signal, len: usize) -> Result<()> {
        self.wait_for(2000, |registry| {
            registry
                .get(serial)
                .map(|d| d.history(signal).len() == len)
                .unwrap_or(false)
        })
        .await
    }

    pub fn history(&self, serial: &str, signal: Signal) -> Option<Vec<f64>> {
        self.session
            .registry()
            .lock()
            .get(serial)
            .map(|d| d.history(signal).to_vec())
    }

    pub fn flags(&self, serial: &str) -> Option<Flags> {
        self.session.registry().lock().get(serial).map(|d| d.flags)
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        self.api.sent_commands()
    }

    /// Reset des commandes enregistrées pour un nouveau scénario
    pub fn reset(&self) {
        self.api.clear();
        log::info!("🧹 Test harness reset");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::{DeviceRecordBuilder, EnvelopeBuilder};

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let mut harness = TestHarness::with_devices(vec![DeviceRecordBuilder::new("A").build()]);
        harness.start().await.unwrap();

        harness
            .push(&EnvelopeBuilder::signals().sample("A", Signal::Power, 1.5).build())
            .unwrap();
        harness.wait_for_history_len("A", Signal::Power, 1).await.unwrap();

        assert_eq!(harness.history("A", Signal::Power), Some(vec![1.5]));
        assert!(harness.sent().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let harness = TestHarness::new();
        assert!(harness.wait_for(50, |registry| !registry.is_empty()).await.is_err());
    }
}

/*!
Helpers pour construire les messages du device-server

Produit des fiches de découverte et des enveloppes `signals` / `flags`
conformes aux payloads de `/api/genesis-mx`.
*/

use laser_core::{DeviceRecord, Flags, HeadInfo, Signal};
use serde_json::{Map, Value};

/// Builder d'une fiche de découverte
#[derive(Debug, Clone)]
pub struct DeviceRecordBuilder {
    record: DeviceRecord,
}

impl DeviceRecordBuilder {
    pub fn new<S: Into<String>>(serial: S) -> Self {
        Self {
            record: DeviceRecord {
                head: HeadInfo {
                    serial: serial.into(),
                    head_type: "MiniX".to_string(),
                    hours: "0".to_string(),
                    board_revision: "A".to_string(),
                    dio_status: "OK".to_string(),
                },
                ..Default::default()
            },
        }
    }

    pub fn flags(mut self, flags: Flags) -> Self {
        self.record.flags = flags;
        self
    }

    pub fn remote_control(mut self, on: bool) -> Self {
        self.record.flags.remote_control = on;
        self
    }

    pub fn software_switch(mut self, on: bool) -> Self {
        self.record.flags.software_switch = on;
        self
    }

    pub fn signal(mut self, signal: Signal, value: f64) -> Self {
        self.record.signals.insert(signal.as_str().to_string(), Some(value));
        self
    }

    pub fn build(self) -> DeviceRecord {
        self.record
    }
}

/// Builder d'enveloppes stream
pub struct EnvelopeBuilder {
    kind: String,
    data: Map<String, Value>,
}

impl EnvelopeBuilder {
    pub fn signals() -> Self {
        Self::raw("signals")
    }

    pub fn flags() -> Self {
        Self::raw("flags")
    }

    /// Type arbitraire (pour tester les messages non reconnus)
    pub fn raw<S: Into<String>>(kind: S) -> Self {
        Self {
            kind: kind.into(),
            data: Map::new(),
        }
    }

    /// Ajoute un échantillon pour un laser
    pub fn sample(mut self, serial: &str, signal: Signal, value: f64) -> Self {
        let entry = self
            .data
            .entry(serial.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(samples) = entry {
            samples.insert(signal.as_str().to_string(), Value::from(value));
        }
        self
    }

    /// Jeu de flags complet pour un laser
    pub fn device_flags(mut self, serial: &str, flags: Flags) -> Self {
        self.data.insert(
            serial.to_string(),
            serde_json::to_value(flags).unwrap_or(Value::Null),
        );
        self
    }

    /// Payload brut pour un laser (flags partiels, valeurs invalides...)
    pub fn payload(mut self, serial: &str, payload: Value) -> Self {
        self.data.insert(serial.to_string(), payload);
        self
    }

    pub fn build(self) -> Value {
        serde_json::json!({
            "type": self.kind,
            "request_id": null,
            "data": Value::Object(self.data),
        })
    }
}

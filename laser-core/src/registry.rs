//! Device registry - authoritative mirror of every discovered laser head.
//!
//! Owns the merge semantics for streamed updates: signal samples are appended
//! to bounded histories, flag snapshots replace the previous set wholesale.
//! Every mutation is published as a [`RegistryEvent`] so a presentation layer
//! can react without the registry knowing anything about rendering.

use crate::config::SessionConfig;
use crate::history::HistoryBuffer;
use crate::models::{DeviceRecord, Flags, HeadInfo, Signal};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceField {
    Signal(Signal),
    Flags,
    PowerLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    DeviceAdded(String),
    DeviceRemoved(String),
    FieldChanged { serial: String, field: DeviceField },
}

#[derive(Debug, Clone)]
pub struct Device {
    pub head: HeadInfo,
    pub flags: Flags,
    pub power_limit: f64,
    /// Time of the last applied push (seed time until the first push).
    pub last_update: Option<OffsetDateTime>,
    signals: [HistoryBuffer; Signal::ALL.len()],
}

impl Device {
    fn from_record(record: DeviceRecord, power_limit: f64, history_capacity: usize) -> Self {
        let mut device = Device {
            head: record.head,
            flags: record.flags,
            power_limit,
            last_update: Some(OffsetDateTime::now_utc()),
            signals: std::array::from_fn(|_| HistoryBuffer::with_capacity(history_capacity)),
        };

        for (name, value) in record.signals {
            match (name.parse::<Signal>(), value) {
                (Ok(signal), Some(value)) => device.signals[signal.index()].append(value),
                (Ok(_), None) => {}
                (Err(e), _) => debug!("[registry] seed {}: {}", device.head.serial, e),
            }
        }
        device
    }

    pub fn serial(&self) -> &str {
        &self.head.serial
    }

    pub fn history(&self, signal: Signal) -> &HistoryBuffer {
        &self.signals[signal.index()]
    }

    pub fn latest(&self, signal: Signal) -> Option<f64> {
        self.history(signal).latest()
    }

    pub fn histories(&self) -> impl Iterator<Item = (Signal, &HistoryBuffer)> {
        Signal::ALL.into_iter().map(move |signal| (signal, self.history(signal)))
    }
}

pub struct DeviceRegistry {
    devices: BTreeMap<String, Device>,
    power_limit: f64,
    history_capacity: usize,
    events: broadcast::Sender<RegistryEvent>,
}

impl DeviceRegistry {
    pub fn new(power_limit: f64, history_capacity: usize, events_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(events_capacity.max(1));
        Self {
            devices: BTreeMap::new(),
            power_limit,
            history_capacity,
            events,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.power_limit,
            config.history_capacity,
            config.events_capacity,
        )
    }

    /// Abonnement aux notifications de changement
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Replaces the whole registry with the discovered devices.
    /// A serial appearing twice keeps its last record.
    pub fn seed(&mut self, records: impl IntoIterator<Item = DeviceRecord>) {
        self.clear();

        for record in records {
            let serial = record.serial().to_string();
            let device = Device::from_record(record, self.power_limit, self.history_capacity);
            if self.devices.insert(serial.clone(), device).is_some() {
                warn!("[registry] duplicate serial {} in discovery, keeping last record", serial);
            } else {
                self.publish(RegistryEvent::DeviceAdded(serial));
            }
        }

        info!("[registry] seeded {} devices", self.devices.len());
    }

    /// Appends one sample; returns `false` (and logs) when the serial is unknown.
    pub fn apply_signal_sample(&mut self, serial: &str, signal: Signal, value: f64) -> bool {
        let Some(device) = self.devices.get_mut(serial) else {
            warn!("[registry] signal {} for unknown device {}, dropped", signal, serial);
            return false;
        };

        device.signals[signal.index()].append(value);
        device.last_update = Some(OffsetDateTime::now_utc());
        self.publish(RegistryEvent::FieldChanged {
            serial: serial.to_string(),
            field: DeviceField::Signal(signal),
        });
        true
    }

    /// Replaces the full flag set; returns `false` (and logs) when the serial is unknown.
    pub fn apply_flags(&mut self, serial: &str, flags: Flags) -> bool {
        let Some(device) = self.devices.get_mut(serial) else {
            warn!("[registry] flags for unknown device {}, dropped", serial);
            return false;
        };

        device.flags = flags;
        device.last_update = Some(OffsetDateTime::now_utc());
        self.publish(RegistryEvent::FieldChanged {
            serial: serial.to_string(),
            field: DeviceField::Flags,
        });
        true
    }

    /// Local clamp bound for every registered device, and for devices seeded later.
    pub fn set_power_limit(&mut self, value: f64) {
        self.power_limit = value;
        let mut changed = Vec::with_capacity(self.devices.len());
        for (serial, device) in self.devices.iter_mut() {
            device.power_limit = value;
            changed.push(serial.clone());
        }
        for serial in changed {
            self.publish(RegistryEvent::FieldChanged {
                serial,
                field: DeviceField::PowerLimit,
            });
        }
        info!("[registry] power limit set to {}", value);
    }

    pub fn power_limit(&self) -> f64 {
        self.power_limit
    }

    pub fn clear(&mut self) {
        let removed = std::mem::take(&mut self.devices);
        for serial in removed.into_keys() {
            self.publish(RegistryEvent::DeviceRemoved(serial));
        }
    }

    pub fn get(&self, serial: &str) -> Option<&Device> {
        self.devices.get(serial)
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.devices.contains_key(serial)
    }

    /// Serials in registry order (sorted).
    pub fn serials(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn snapshot(&self) -> Vec<Device> {
        self.devices.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn publish(&self, event: RegistryEvent) {
        // pas d'abonné = pas d'erreur
        let _ = self.events.send(event);
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

use crate::error::UnknownSignal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// Structures basées sur les payloads du device-server (/api/genesis-mx)

/// Numeric telemetry channels reported for every laser head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Signal {
    Power,
    PowerSetpoint,
    LddCurrent,
    LddCurrentLimit,
    MainTemperature,
    ShgTemperature,
    BrfTemperature,
    EtalonTemperature,
}

impl Signal {
    pub const ALL: [Signal; 8] = [
        Signal::Power,
        Signal::PowerSetpoint,
        Signal::LddCurrent,
        Signal::LddCurrentLimit,
        Signal::MainTemperature,
        Signal::ShgTemperature,
        Signal::BrfTemperature,
        Signal::EtalonTemperature,
    ];

    /// Wire name, as used in `signals` payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Power => "power",
            Signal::PowerSetpoint => "powerSetpoint",
            Signal::LddCurrent => "lddCurrent",
            Signal::LddCurrentLimit => "lddCurrentLimit",
            Signal::MainTemperature => "mainTemperature",
            Signal::ShgTemperature => "shgTemperature",
            Signal::BrfTemperature => "brfTemperature",
            Signal::EtalonTemperature => "etalonTemperature",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = UnknownSignal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signal::ALL
            .into_iter()
            .find(|signal| signal.as_str() == s)
            .ok_or_else(|| UnknownSignal(s.to_string()))
    }
}

/// Hardware-confirmed safety state of a head.
///
/// Missing fields deserialize as `false`: a `flags` push is a complete
/// snapshot, nothing is carried over from the previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Flags {
    pub interlock: bool,
    pub key_switch: bool,
    pub software_switch: bool,
    pub remote_control: bool,
    pub analog_input: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadInfo {
    pub serial: String,
    #[serde(rename = "type", default)]
    pub head_type: String,
    #[serde(default)]
    pub hours: String,
    #[serde(default)]
    pub board_revision: String,
    #[serde(default)]
    pub dio_status: String,
}

/// One entry of the discovery response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub head: HeadInfo,
    #[serde(default)]
    pub flags: Flags,
    /// Initial samples keyed by wire name; `null` values are skipped at seed.
    #[serde(default)]
    pub signals: BTreeMap<String, Option<f64>>,
}

impl DeviceRecord {
    pub fn serial(&self) -> &str {
        &self.head.serial
    }
}

/// Stream message: `{ "type": ..., "request_id": ..., "data": { serial: payload } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

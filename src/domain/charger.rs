//! Charger domain entity

use chrono::{DateTime, Utc};

/// Charger operational status
///
/// Status transitions are driven by one connection at a time: boot moves the
/// charger to `Available`, a StartTransaction to `Charging`, a
/// StopTransaction back to `Available`, and a disconnect to `Offline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargerStatus {
    /// Connected, no open transaction
    Available,
    /// Connected with an open transaction
    Charging,
    /// Not currently connected
    Offline,
    /// Connected but the boot handshake has not completed yet
    Connected,
}

impl Default for ChargerStatus {
    fn default() -> Self {
        Self::Offline
    }
}

impl std::fmt::Display for ChargerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available => write!(f, "Available"),
            Self::Charging => write!(f, "Charging"),
            Self::Offline => write!(f, "Offline"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

impl From<&str> for ChargerStatus {
    fn from(s: &str) -> Self {
        match s {
            "Available" => Self::Available,
            "Charging" => Self::Charging,
            "Connected" => Self::Connected,
            _ => Self::Offline,
        }
    }
}

/// Charger entity
///
/// One record per charge-point identifier; created on the first successful
/// connection handshake and never deleted by the session layer.
#[derive(Debug, Clone)]
pub struct Charger {
    /// Charge-point identifier, assigned by the device/operator
    pub id: String,
    pub status: ChargerStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub vendor: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub firmware_version: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Charger {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ChargerStatus::Connected,
            last_heartbeat: None,
            vendor: None,
            model: None,
            serial_number: None,
            firmware_version: None,
            registered_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn update_heartbeat(&mut self) {
        self.last_heartbeat = Some(Utc::now());
    }
}

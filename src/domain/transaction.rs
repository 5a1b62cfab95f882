//! Transaction domain entity

use chrono::{DateTime, Utc};

/// Charging transaction
///
/// A transaction is open while `stopped_at` is `None`. At most one open
/// transaction may exist per charger; the store enforces this on creation.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Store-assigned id, monotonically increasing, never reused
    pub id: i32,
    /// Owning charger identifier (reference, not ownership)
    pub charge_point_id: String,
    /// Authorization token that started the transaction
    pub id_tag: String,
    /// Meter value at start (Wh)
    pub meter_start: i32,
    /// Meter value at stop (Wh)
    pub meter_stop: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<String>,
}

/// Fields the session supplies when opening a transaction; the store
/// assigns the id and start time.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub charge_point_id: String,
    pub id_tag: String,
    pub meter_start: i32,
}

impl Transaction {
    pub fn is_open(&self) -> bool {
        self.stopped_at.is_none()
    }

    /// Close the transaction. Returns the recorded energy delta when the
    /// meter readings are consistent.
    pub fn stop(&mut self, meter_stop: i32, reason: Option<String>) -> Option<i32> {
        self.meter_stop = Some(meter_stop);
        self.stopped_at = Some(Utc::now());
        self.stop_reason = reason;
        self.energy_consumed()
    }

    /// Energy delivered in Wh, `None` while open or when the stop reading
    /// ran backwards.
    pub fn energy_consumed(&self) -> Option<i32> {
        self.meter_stop
            .map(|stop| stop - self.meter_start)
            .filter(|wh| *wh >= 0)
    }
}

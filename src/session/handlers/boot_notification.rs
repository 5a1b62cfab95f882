//! BootNotification: the connection handshake
//!
//! Records the device identity the charge point reports and moves the
//! charger to `Available`. The reply carries the heartbeat interval the
//! charge point must use from then on.

use chrono::Utc;
use tracing::info;

use crate::domain::{ChargerStatus, DomainError};
use crate::protocol::messages::{
    BootNotificationRequest, BootNotificationResponse, RegistrationStatus,
};
use crate::protocol::Frame;
use crate::session::{ChargerSession, SessionError};
use crate::storage::ChargerStore;

impl ChargerSession {
    pub(crate) async fn handle_boot_notification(
        &mut self,
        unique_id: &str,
        payload: serde_json::Value,
    ) -> Result<Frame, SessionError> {
        let request: BootNotificationRequest = serde_json::from_value(payload)?;

        let mut charger = self
            .store
            .get_charger(&self.charge_point_id)
            .await?
            .ok_or_else(|| DomainError::ChargerNotFound(self.charge_point_id.clone()))?;

        charger.vendor = Some(request.charge_point_vendor.clone());
        charger.model = Some(request.charge_point_model.clone());
        charger.serial_number = request.charge_point_serial_number;
        charger.firmware_version = request.firmware_version;
        charger.status = ChargerStatus::Available;
        self.store.update_charger(charger).await?;

        self.booted = true;
        info!(
            charge_point_id = self.charge_point_id.as_str(),
            vendor = request.charge_point_vendor.as_str(),
            model = request.charge_point_model.as_str(),
            "Boot accepted"
        );

        let response = BootNotificationResponse {
            current_time: Utc::now(),
            interval: self.heartbeat_interval,
            status: RegistrationStatus::Accepted,
        };
        // Response types serialize without failure
        Ok(Frame::result(
            unique_id,
            serde_json::to_value(response).unwrap(),
        ))
    }
}

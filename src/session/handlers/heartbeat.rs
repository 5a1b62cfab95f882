//! Heartbeat: liveness ping, answered with the server clock

use chrono::Utc;
use tracing::debug;

use crate::domain::DomainError;
use crate::protocol::messages::HeartbeatResponse;
use crate::protocol::Frame;
use crate::session::{ChargerSession, SessionError};
use crate::storage::ChargerStore;

impl ChargerSession {
    pub(crate) async fn handle_heartbeat(&mut self, unique_id: &str) -> Result<Frame, SessionError> {
        let mut charger = self
            .store
            .get_charger(&self.charge_point_id)
            .await?
            .ok_or_else(|| DomainError::ChargerNotFound(self.charge_point_id.clone()))?;
        charger.update_heartbeat();
        self.store.update_charger(charger).await?;

        debug!(
            charge_point_id = self.charge_point_id.as_str(),
            "Heartbeat"
        );
        let response = HeartbeatResponse {
            current_time: Utc::now(),
        };
        Ok(Frame::result(
            unique_id,
            serde_json::to_value(response).unwrap(),
        ))
    }
}

//! StopTransaction: close a charging transaction
//!
//! A stop naming a transaction that does not exist, is already closed, or
//! belongs to another charger is answered with `Invalid` and mutates
//! nothing. A stop meter reading below the start reading is recorded as
//! reported; the inconsistency is logged and the energy delta treated as
//! unknown.

use tracing::{info, warn};

use crate::domain::ChargerStatus;
use crate::protocol::messages::{
    AuthorizationStatus, IdTagInfo, StopTransactionRequest, StopTransactionResponse,
};
use crate::protocol::Frame;
use crate::session::{ChargerSession, SessionError};
use crate::storage::ChargerStore;

impl ChargerSession {
    pub(crate) async fn handle_stop_transaction(
        &mut self,
        unique_id: &str,
        payload: serde_json::Value,
    ) -> Result<Frame, SessionError> {
        let request: StopTransactionRequest = serde_json::from_value(payload)?;

        let transaction = match self.store.get_transaction(request.transaction_id).await? {
            Some(tx) if tx.is_open() && tx.charge_point_id == self.charge_point_id => tx,
            Some(tx) => {
                warn!(
                    charge_point_id = self.charge_point_id.as_str(),
                    transaction_id = request.transaction_id,
                    open = tx.is_open(),
                    owner = tx.charge_point_id.as_str(),
                    "StopTransaction refused; not this charger's open transaction"
                );
                return Ok(invalid(unique_id));
            }
            None => {
                warn!(
                    charge_point_id = self.charge_point_id.as_str(),
                    transaction_id = request.transaction_id,
                    "StopTransaction for unknown transaction"
                );
                return Ok(invalid(unique_id));
            }
        };

        let mut transaction = transaction;
        let energy = transaction.stop(request.meter_stop, request.reason.clone());
        if energy.is_none() {
            warn!(
                charge_point_id = self.charge_point_id.as_str(),
                transaction_id = transaction.id,
                meter_start = transaction.meter_start,
                meter_stop = request.meter_stop,
                "Stop meter reading below start; energy delta discarded"
            );
        }
        self.store.update_transaction(transaction.clone()).await?;

        self.store
            .update_charger_status(&self.charge_point_id, ChargerStatus::Available)
            .await?;
        if self.open_transaction_id == Some(transaction.id) {
            self.open_transaction_id = None;
        }

        info!(
            charge_point_id = self.charge_point_id.as_str(),
            transaction_id = transaction.id,
            energy_wh = energy,
            reason = request.reason.as_deref(),
            "Transaction stopped"
        );

        let response = StopTransactionResponse {
            id_tag_info: IdTagInfo::new(AuthorizationStatus::Accepted),
        };
        Ok(Frame::result(
            unique_id,
            serde_json::to_value(response).unwrap(),
        ))
    }
}

fn invalid(unique_id: &str) -> Frame {
    let response = StopTransactionResponse {
        id_tag_info: IdTagInfo::new(AuthorizationStatus::Invalid),
    };
    Frame::result(unique_id, serde_json::to_value(response).unwrap())
}

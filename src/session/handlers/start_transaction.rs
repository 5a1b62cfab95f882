//! StartTransaction: open a charging transaction
//!
//! The store enforces at-most-one open transaction per charger, so a second
//! start while one is open comes back as `TransactionAlreadyOpen` and is
//! reported to the charge point as `ConcurrentTx`.

use tracing::{info, warn};

use crate::auth::AuthorizationService;
use crate::domain::{ChargerStatus, DomainError, NewTransaction};
use crate::protocol::messages::{
    AuthorizationStatus, IdTagInfo, StartTransactionRequest, StartTransactionResponse,
};
use crate::protocol::Frame;
use crate::session::{ChargerSession, SessionError};
use crate::storage::ChargerStore;

impl ChargerSession {
    pub(crate) async fn handle_start_transaction(
        &mut self,
        unique_id: &str,
        payload: serde_json::Value,
    ) -> Result<Frame, SessionError> {
        let request: StartTransactionRequest = serde_json::from_value(payload)?;

        let status = self.authorizer.authorize(&request.id_tag).await;
        if status != AuthorizationStatus::Accepted {
            warn!(
                charge_point_id = self.charge_point_id.as_str(),
                id_tag = request.id_tag.as_str(),
                status = ?status,
                "StartTransaction refused by authorization"
            );
            return Ok(rejection(unique_id, 0, status));
        }

        let created = self
            .store
            .create_transaction(NewTransaction {
                charge_point_id: self.charge_point_id.clone(),
                id_tag: request.id_tag.clone(),
                meter_start: request.meter_start,
            })
            .await;

        let transaction = match created {
            Ok(tx) => tx,
            Err(DomainError::TransactionAlreadyOpen { transaction_id, .. }) => {
                warn!(
                    charge_point_id = self.charge_point_id.as_str(),
                    open_transaction_id = transaction_id,
                    "StartTransaction while a transaction is already open"
                );
                return Ok(rejection(
                    unique_id,
                    transaction_id,
                    AuthorizationStatus::ConcurrentTx,
                ));
            }
            Err(e) => return Err(e.into()),
        };

        self.store
            .update_charger_status(&self.charge_point_id, ChargerStatus::Charging)
            .await?;
        self.open_transaction_id = Some(transaction.id);

        info!(
            charge_point_id = self.charge_point_id.as_str(),
            transaction_id = transaction.id,
            id_tag = request.id_tag.as_str(),
            meter_start = request.meter_start,
            "Transaction started"
        );

        let response = StartTransactionResponse {
            transaction_id: transaction.id,
            id_tag_info: IdTagInfo::new(AuthorizationStatus::Accepted),
        };
        Ok(Frame::result(
            unique_id,
            serde_json::to_value(response).unwrap(),
        ))
    }
}

fn rejection(unique_id: &str, transaction_id: i32, status: AuthorizationStatus) -> Frame {
    let response = StartTransactionResponse {
        transaction_id,
        id_tag_info: IdTagInfo::new(status),
    };
    Frame::result(unique_id, serde_json::to_value(response).unwrap())
}

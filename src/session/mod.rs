//! Per-connection charge point session
//!
//! One [`ChargerSession`] exists per live WebSocket connection. It owns the
//! protocol state for that charge point: whether the boot handshake has
//! completed, and which transaction (if any) is currently open. The server
//! feeds it raw frames; it answers with raw frames, so the transport layer
//! stays free of OCPP semantics.
//!
//! A session is single-threaded by construction. Frames from one connection
//! arrive in order and are handled one at a time, so session state needs no
//! internal locking.

mod handlers;

use tracing::{debug, error, info, warn};

use crate::auth::SharedAuthorizer;
use crate::domain::{Charger, ChargerStatus, DomainError, DomainResult};
use crate::protocol::frame::{error_code, salvage_unique_id};
use crate::protocol::messages::{action, SUPPORTED_ACTIONS};
use crate::protocol::{Frame, FrameError};
use crate::storage::{ChargerStore, SharedStore};

pub struct ChargerSession {
    charge_point_id: String,
    store: SharedStore,
    authorizer: SharedAuthorizer,
    /// Heartbeat interval handed to the charge point at boot, in seconds.
    heartbeat_interval: u32,
    /// Set once a BootNotification has been accepted on this connection.
    booted: bool,
    /// Cached id of the charger's open transaction, if any.
    open_transaction_id: Option<i32>,
}

impl ChargerSession {
    pub fn new(
        charge_point_id: impl Into<String>,
        store: SharedStore,
        authorizer: SharedAuthorizer,
        heartbeat_interval: u32,
    ) -> Self {
        Self {
            charge_point_id: charge_point_id.into(),
            store,
            authorizer,
            heartbeat_interval,
            booted: false,
            open_transaction_id: None,
        }
    }

    pub fn charge_point_id(&self) -> &str {
        &self.charge_point_id
    }

    /// Load or create the charger record for this connection.
    ///
    /// Called once after the WebSocket handshake, before any frame is
    /// handled. A failure here means the backend cannot track the charger,
    /// so the caller must refuse the connection. An open transaction left
    /// over from a previous connection is picked up again; it stays open
    /// until an explicit StopTransaction closes it.
    pub async fn initialize(&mut self) -> DomainResult<()> {
        match self.store.get_charger(&self.charge_point_id).await? {
            Some(mut charger) => {
                charger.status = ChargerStatus::Connected;
                self.store.update_charger(charger).await?;
            }
            None => {
                self.store
                    .create_charger(Charger::new(&self.charge_point_id))
                    .await?;
            }
        }

        if let Some(tx) = self.store.open_transaction(&self.charge_point_id).await? {
            info!(
                charge_point_id = self.charge_point_id.as_str(),
                transaction_id = tx.id,
                "Resuming connection with an open transaction"
            );
            self.open_transaction_id = Some(tx.id);
        }
        Ok(())
    }

    /// Handle one raw frame, returning the raw frame to send back (if any).
    ///
    /// Calls always produce a reply, CallResult or CallError on its own. A
    /// frame that cannot be parsed produces a CallError with whatever unique
    /// id can be salvaged from the text; the connection stays open.
    pub async fn handle_message(&mut self, text: &str) -> Option<String> {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    charge_point_id = self.charge_point_id.as_str(),
                    error = %e,
                    "Rejecting malformed frame"
                );
                let code = match e {
                    FrameError::UnknownMessageType(_) => error_code::PROTOCOL_ERROR,
                    _ => error_code::FORMATION_VIOLATION,
                };
                return Some(
                    Frame::error(salvage_unique_id(text), code, e.to_string()).serialize(),
                );
            }
        };

        match frame {
            Frame::Call {
                unique_id,
                action,
                payload,
            } => Some(self.dispatch(unique_id, &action, payload).await),
            Frame::CallResult { unique_id, payload } => {
                // Answer to a command this backend pushed (RemoteStart/Stop).
                debug!(
                    charge_point_id = self.charge_point_id.as_str(),
                    unique_id = unique_id.as_str(),
                    %payload,
                    "Charge point acknowledged command"
                );
                None
            }
            Frame::CallError {
                unique_id,
                error_code,
                error_description,
                ..
            } => {
                warn!(
                    charge_point_id = self.charge_point_id.as_str(),
                    unique_id = unique_id.as_str(),
                    error_code = error_code.as_str(),
                    error_description = error_description.as_str(),
                    "Charge point rejected command"
                );
                None
            }
        }
    }

    /// Route one inbound call to its handler.
    ///
    /// Every accepted action appears here explicitly; anything else is
    /// answered with a NotImplemented CallError rather than silently
    /// dropped.
    async fn dispatch(&mut self, unique_id: String, action_name: &str, payload: serde_json::Value) -> String {
        // An unsupported action fails closed with the same code regardless
        // of session state.
        if !SUPPORTED_ACTIONS.contains(&action_name) {
            warn!(
                charge_point_id = self.charge_point_id.as_str(),
                action = action_name,
                "Unsupported action"
            );
            return Frame::error(
                unique_id,
                error_code::NOT_IMPLEMENTED,
                format!("Action not supported: {action_name}"),
            )
            .serialize();
        }

        // Everything except the boot handshake requires a completed boot.
        if !self.booted && action_name != action::BOOT_NOTIFICATION {
            warn!(
                charge_point_id = self.charge_point_id.as_str(),
                action = action_name,
                "Call before BootNotification"
            );
            return Frame::error(
                unique_id,
                error_code::PROTOCOL_ERROR,
                format!("{action_name} requires a completed BootNotification"),
            )
            .serialize();
        }

        let result = match action_name {
            action::BOOT_NOTIFICATION => self.handle_boot_notification(&unique_id, payload).await,
            action::HEARTBEAT => self.handle_heartbeat(&unique_id).await,
            action::AUTHORIZE => self.handle_authorize(&unique_id, payload).await,
            action::START_TRANSACTION => self.handle_start_transaction(&unique_id, payload).await,
            action::STOP_TRANSACTION => self.handle_stop_transaction(&unique_id, payload).await,
            // Unreachable after the supported-set check, but still fail closed.
            other => {
                return Frame::error(
                    unique_id,
                    error_code::NOT_IMPLEMENTED,
                    format!("Action not supported: {other}"),
                )
                .serialize();
            }
        };

        match result {
            Ok(frame) => frame.serialize(),
            Err(SessionError::Payload(e)) => Frame::error(
                unique_id,
                error_code::FORMATION_VIOLATION,
                format!("Invalid {action_name} payload: {e}"),
            )
            .serialize(),
            Err(SessionError::Domain(e)) => {
                error!(
                    charge_point_id = self.charge_point_id.as_str(),
                    action = action_name,
                    error = %e,
                    "Call handling failed"
                );
                Frame::error(unique_id, error_code::INTERNAL_ERROR, "Internal error").serialize()
            }
        }
    }

    /// Best-effort offline marking when the connection goes away.
    ///
    /// An open transaction is deliberately left open; the charge point is
    /// expected to report its StopTransaction after reconnecting. Callers
    /// must skip this for a superseded connection (epoch-guarded
    /// deregister returned false), or the stale cleanup would overwrite
    /// the replacement session's charger status.
    pub async fn on_disconnect(&self) {
        if let Err(e) = self
            .store
            .update_charger_status(&self.charge_point_id, ChargerStatus::Offline)
            .await
        {
            warn!(
                charge_point_id = self.charge_point_id.as_str(),
                error = %e,
                "Failed to mark charger offline on disconnect"
            );
        }
    }
}

/// Why a call handler could not produce a CallResult.
#[derive(Debug)]
pub(crate) enum SessionError {
    /// The payload did not deserialize into the action's request type
    Payload(serde_json::Error),
    /// Storage or domain failure
    Domain(DomainError),
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Payload(e)
    }
}

impl From<DomainError> for SessionError {
    fn from(e: DomainError) -> Self {
        Self::Domain(e)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use super::*;
    use crate::auth::AcceptAllAuthorizer;
    use crate::storage::{InMemoryStore, SharedStore};

    fn session_with_store() -> (ChargerSession, SharedStore) {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let session = ChargerSession::new(
            "CP-1",
            store.clone(),
            Arc::new(AcceptAllAuthorizer),
            300,
        );
        (session, store)
    }

    async fn booted_session() -> (ChargerSession, SharedStore) {
        let (mut session, store) = session_with_store();
        session.initialize().await.unwrap();
        let reply = session.handle_message(&boot_call("b1")).await.unwrap();
        assert_eq!(parsed(&reply)[0], 3);
        (session, store)
    }

    fn boot_call(id: &str) -> String {
        format!(
            r#"[2,"{id}","BootNotification",{{"chargePointVendor":"Acme","chargePointModel":"X1"}}]"#
        )
    }

    fn parsed(reply: &str) -> Value {
        serde_json::from_str(reply).unwrap()
    }

    #[tokio::test]
    async fn boot_creates_charger_and_accepts() {
        let (mut session, store) = session_with_store();
        session.initialize().await.unwrap();

        let reply = session.handle_message(&boot_call("b1")).await.unwrap();
        let v = parsed(&reply);
        assert_eq!(v[0], 3);
        assert_eq!(v[1], "b1");
        assert_eq!(v[2]["status"], "Accepted");
        assert_eq!(v[2]["interval"], 300);

        let charger = store.get_charger("CP-1").await.unwrap().unwrap();
        assert_eq!(charger.status, ChargerStatus::Available);
        assert_eq!(charger.vendor.as_deref(), Some("Acme"));
        assert_eq!(charger.model.as_deref(), Some("X1"));
    }

    #[tokio::test]
    async fn heartbeat_before_boot_is_a_protocol_error() {
        let (mut session, _store) = session_with_store();
        session.initialize().await.unwrap();

        let reply = session
            .handle_message(r#"[2,"h1","Heartbeat",{}]"#)
            .await
            .unwrap();
        let v = parsed(&reply);
        assert_eq!(v[0], 4);
        assert_eq!(v[1], "h1");
        assert_eq!(v[2], "ProtocolError");
    }

    #[tokio::test]
    async fn heartbeat_updates_last_seen() {
        let (mut session, store) = booted_session().await;

        let reply = session
            .handle_message(r#"[2,"h1","Heartbeat",{}]"#)
            .await
            .unwrap();
        let v = parsed(&reply);
        assert_eq!(v[0], 3);
        assert!(v[2]["currentTime"].is_string());

        let charger = store.get_charger("CP-1").await.unwrap().unwrap();
        assert!(charger.last_heartbeat.is_some());
    }

    #[tokio::test]
    async fn authorize_accepts_known_tag() {
        let (mut session, _store) = booted_session().await;

        let reply = session
            .handle_message(r#"[2,"a1","Authorize",{"idTag":"TAG1"}]"#)
            .await
            .unwrap();
        let v = parsed(&reply);
        assert_eq!(v[0], 3);
        assert_eq!(v[2]["idTagInfo"]["status"], "Accepted");
    }

    #[tokio::test]
    async fn full_transaction_lifecycle() {
        let (mut session, store) = booted_session().await;

        let reply = session
            .handle_message(r#"[2,"s1","StartTransaction",{"idTag":"TAG1","meterStart":100}]"#)
            .await
            .unwrap();
        let v = parsed(&reply);
        assert_eq!(v[0], 3);
        assert_eq!(v[2]["idTagInfo"]["status"], "Accepted");
        let tx_id = v[2]["transactionId"].as_i64().unwrap() as i32;

        let charger = store.get_charger("CP-1").await.unwrap().unwrap();
        assert_eq!(charger.status, ChargerStatus::Charging);

        let stop = format!(
            r#"[2,"s2","StopTransaction",{{"transactionId":{tx_id},"meterStop":150,"reason":"Local"}}]"#
        );
        let reply = session.handle_message(&stop).await.unwrap();
        let v = parsed(&reply);
        assert_eq!(v[0], 3);
        assert_eq!(v[2]["idTagInfo"]["status"], "Accepted");

        let tx = store.get_transaction(tx_id).await.unwrap().unwrap();
        assert!(!tx.is_open());
        assert_eq!(tx.meter_stop, Some(150));
        assert_eq!(tx.stop_reason.as_deref(), Some("Local"));

        let charger = store.get_charger("CP-1").await.unwrap().unwrap();
        assert_eq!(charger.status, ChargerStatus::Available);
    }

    #[tokio::test]
    async fn second_start_is_rejected_as_concurrent() {
        let (mut session, store) = booted_session().await;

        session
            .handle_message(r#"[2,"s1","StartTransaction",{"idTag":"TAG1","meterStart":100}]"#)
            .await
            .unwrap();
        let reply = session
            .handle_message(r#"[2,"s2","StartTransaction",{"idTag":"TAG2","meterStart":0}]"#)
            .await
            .unwrap();
        let v = parsed(&reply);
        assert_eq!(v[0], 3);
        assert_eq!(v[2]["idTagInfo"]["status"], "ConcurrentTx");

        // Only the first transaction exists.
        let txs = store.transactions_for_charger("CP-1").await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].id_tag, "TAG1");
    }

    #[tokio::test]
    async fn stop_of_unknown_transaction_is_invalid() {
        let (mut session, _store) = booted_session().await;

        let reply = session
            .handle_message(r#"[2,"s1","StopTransaction",{"transactionId":99,"meterStop":10}]"#)
            .await
            .unwrap();
        let v = parsed(&reply);
        assert_eq!(v[0], 3);
        assert_eq!(v[2]["idTagInfo"]["status"], "Invalid");
    }

    #[tokio::test]
    async fn stop_of_closed_transaction_does_not_mutate() {
        let (mut session, store) = booted_session().await;

        session
            .handle_message(r#"[2,"s1","StartTransaction",{"idTag":"TAG1","meterStart":100}]"#)
            .await
            .unwrap();
        session
            .handle_message(r#"[2,"s2","StopTransaction",{"transactionId":1,"meterStop":150}]"#)
            .await
            .unwrap();

        let reply = session
            .handle_message(r#"[2,"s3","StopTransaction",{"transactionId":1,"meterStop":999}]"#)
            .await
            .unwrap();
        let v = parsed(&reply);
        assert_eq!(v[2]["idTagInfo"]["status"], "Invalid");

        let tx = store.get_transaction(1).await.unwrap().unwrap();
        assert_eq!(tx.meter_stop, Some(150));
    }

    #[tokio::test]
    async fn backwards_meter_still_closes_transaction() {
        let (mut session, store) = booted_session().await;

        session
            .handle_message(r#"[2,"s1","StartTransaction",{"idTag":"TAG1","meterStart":100}]"#)
            .await
            .unwrap();
        let reply = session
            .handle_message(r#"[2,"s2","StopTransaction",{"transactionId":1,"meterStop":40}]"#)
            .await
            .unwrap();
        assert_eq!(parsed(&reply)[2]["idTagInfo"]["status"], "Accepted");

        let tx = store.get_transaction(1).await.unwrap().unwrap();
        assert!(!tx.is_open());
        assert_eq!(tx.meter_stop, Some(40));
        assert_eq!(tx.energy_consumed(), None);
    }

    #[tokio::test]
    async fn unknown_action_gets_not_implemented() {
        let (mut session, _store) = booted_session().await;

        let reply = session
            .handle_message(r#"[2,"r1","Reset",{"type":"Soft"}]"#)
            .await
            .unwrap();
        let v = parsed(&reply);
        assert_eq!(v[0], 4);
        assert_eq!(v[2], "NotImplemented");
    }

    #[tokio::test]
    async fn unknown_action_before_boot_still_not_implemented() {
        let (mut session, _store) = session_with_store();
        session.initialize().await.unwrap();

        let reply = session
            .handle_message(r#"[2,"r1","Reset",{"type":"Soft"}]"#)
            .await
            .unwrap();
        let v = parsed(&reply);
        assert_eq!(v[0], 4);
        assert_eq!(v[2], "NotImplemented");
    }

    #[tokio::test]
    async fn every_supported_action_reaches_a_handler() {
        let (mut session, _store) = booted_session().await;

        for action_name in SUPPORTED_ACTIONS {
            let call = format!(r#"[2,"t-{action_name}","{action_name}",{{}}]"#);
            let reply = session.handle_message(&call).await.unwrap();
            let v = parsed(&reply);
            // A handler may reject the empty payload, but never as an
            // unsupported action.
            assert_ne!(v[2], "NotImplemented", "{action_name} fell through dispatch");
        }
    }

    #[tokio::test]
    async fn malformed_frame_answers_with_salvaged_id() {
        let (mut session, _store) = booted_session().await;

        let reply = session.handle_message(r#"[2,"x9"]"#).await.unwrap();
        let v = parsed(&reply);
        assert_eq!(v[0], 4);
        assert_eq!(v[1], "x9");
        assert_eq!(v[2], "FormationViolation");

        let reply = session.handle_message("not json at all").await.unwrap();
        let v = parsed(&reply);
        assert_eq!(v[1], "-1");
    }

    #[tokio::test]
    async fn bad_payload_is_a_formation_violation() {
        let (mut session, _store) = booted_session().await;

        let reply = session
            .handle_message(r#"[2,"s1","StartTransaction",{"meterStart":"not-a-number"}]"#)
            .await
            .unwrap();
        let v = parsed(&reply);
        assert_eq!(v[0], 4);
        assert_eq!(v[2], "FormationViolation");
    }

    #[tokio::test]
    async fn call_result_frames_produce_no_reply() {
        let (mut session, _store) = booted_session().await;
        assert!(session
            .handle_message(r#"[3,"cmd-1",{"status":"Accepted"}]"#)
            .await
            .is_none());
        assert!(session
            .handle_message(r#"[4,"cmd-2","NotSupported","",{}]"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn disconnect_marks_offline_and_leaves_transaction_open() {
        let (mut session, store) = booted_session().await;

        session
            .handle_message(r#"[2,"s1","StartTransaction",{"idTag":"TAG1","meterStart":100}]"#)
            .await
            .unwrap();
        session.on_disconnect().await;

        let charger = store.get_charger("CP-1").await.unwrap().unwrap();
        assert_eq!(charger.status, ChargerStatus::Offline);
        assert!(store.open_transaction("CP-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reconnect_resumes_open_transaction() {
        let (mut session, store) = booted_session().await;
        session
            .handle_message(r#"[2,"s1","StartTransaction",{"idTag":"TAG1","meterStart":100}]"#)
            .await
            .unwrap();
        session.on_disconnect().await;
        drop(session);

        let mut session = ChargerSession::new(
            "CP-1",
            store.clone(),
            Arc::new(AcceptAllAuthorizer),
            300,
        );
        session.initialize().await.unwrap();
        assert_eq!(session.open_transaction_id, Some(1));

        session.handle_message(&boot_call("b2")).await.unwrap();
        let reply = session
            .handle_message(r#"[2,"s2","StopTransaction",{"transactionId":1,"meterStop":180}]"#)
            .await
            .unwrap();
        assert_eq!(parsed(&reply)[2]["idTagInfo"]["status"], "Accepted");
    }
}

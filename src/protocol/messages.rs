//! Typed OCPP 1.6 call and result payloads
//!
//! Only the action subset the session layer speaks. Field names follow the
//! OCPP-J wire convention (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Action names as they appear on the wire.
pub mod action {
    pub const BOOT_NOTIFICATION: &str = "BootNotification";
    pub const HEARTBEAT: &str = "Heartbeat";
    pub const START_TRANSACTION: &str = "StartTransaction";
    pub const STOP_TRANSACTION: &str = "StopTransaction";
    pub const AUTHORIZE: &str = "Authorize";
    pub const REMOTE_START_TRANSACTION: &str = "RemoteStartTransaction";
    pub const REMOTE_STOP_TRANSACTION: &str = "RemoteStopTransaction";
}

/// Inbound actions this backend accepts from a charge point.
pub const SUPPORTED_ACTIONS: [&str; 5] = [
    action::BOOT_NOTIFICATION,
    action::HEARTBEAT,
    action::START_TRANSACTION,
    action::STOP_TRANSACTION,
    action::AUTHORIZE,
];

// ── Common payload fragments ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Accepted,
    Pending,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationStatus {
    Accepted,
    Blocked,
    Expired,
    Invalid,
    ConcurrentTx,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdTagInfo {
    pub status: AuthorizationStatus,
}

impl IdTagInfo {
    pub fn new(status: AuthorizationStatus) -> Self {
        Self { status }
    }
}

// ── BootNotification ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationRequest {
    pub charge_point_model: String,
    pub charge_point_vendor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_point_serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootNotificationResponse {
    pub current_time: DateTime<Utc>,
    pub interval: u32,
    pub status: RegistrationStatus,
}

// ── Heartbeat ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub current_time: DateTime<Utc>,
}

// ── StartTransaction ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionRequest {
    pub id_tag: String,
    pub meter_start: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTransactionResponse {
    pub transaction_id: i32,
    pub id_tag_info: IdTagInfo,
}

// ── StopTransaction ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionRequest {
    pub meter_stop: i32,
    pub transaction_id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTransactionResponse {
    pub id_tag_info: IdTagInfo,
}

// ── Authorize ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub id_tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub id_tag_info: IdTagInfo,
}

// ── Remote commands (CS → CP) ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStartTransactionRequest {
    pub id_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStopTransactionRequest {
    pub transaction_id: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_request_wire_names() {
        let req: BootNotificationRequest = serde_json::from_str(
            r#"{"chargePointVendor":"Acme","chargePointModel":"X1","firmwareVersion":"1.2"}"#,
        )
        .unwrap();
        assert_eq!(req.charge_point_vendor, "Acme");
        assert_eq!(req.charge_point_model, "X1");
        assert_eq!(req.firmware_version.as_deref(), Some("1.2"));
        assert!(req.charge_point_serial_number.is_none());
    }

    #[test]
    fn boot_response_serializes_camel_case() {
        let resp = BootNotificationResponse {
            current_time: Utc::now(),
            interval: 300,
            status: RegistrationStatus::Accepted,
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["interval"], 300);
        assert_eq!(json["status"], "Accepted");
        assert!(json["currentTime"].is_string());
    }

    #[test]
    fn start_request_ignores_extra_fields() {
        let req: StartTransactionRequest = serde_json::from_str(
            r#"{"idTag":"TAG1","meterStart":100,"connectorId":1,"reservationId":7}"#,
        )
        .unwrap();
        assert_eq!(req.id_tag, "TAG1");
        assert_eq!(req.meter_start, 100);
        assert_eq!(req.connector_id, Some(1));
    }

    #[test]
    fn stop_response_wire_shape() {
        let resp = StopTransactionResponse {
            id_tag_info: IdTagInfo::new(AuthorizationStatus::Accepted),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["idTagInfo"]["status"], "Accepted");
    }

    #[test]
    fn concurrent_tx_status_spelling() {
        let info = IdTagInfo::new(AuthorizationStatus::ConcurrentTx);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["status"], "ConcurrentTx");
    }
}

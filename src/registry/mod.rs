//! Session registry — directory of live charge point connections
//!
//! Maps a charge-point identifier to a handle that can push a directive
//! into that charge point's live session, wherever it runs. Two backends
//! implement the same contract:
//!
//! - [`LocalRegistry`] — in-process table for single-instance deployments
//! - [`RedisRegistry`] — Redis-backed directory with a pub/sub relay for
//!   horizontally scaled deployments
//!
//! Registration hands back an epoch token; deregistration is a no-op unless
//! the epoch still matches, so a late cleanup from a superseded connection
//! cannot clobber its replacement.

mod local;
mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{RegistryBackend, RegistryConfig};
use crate::protocol::messages::{
    action, RemoteStartTransactionRequest, RemoteStopTransactionRequest,
};
use crate::protocol::Frame;

pub use local::LocalRegistry;
pub use redis::RedisRegistry;

/// A command pushed into a live session from outside its own request flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Directive {
    StartCharging { id_tag: String },
    StopCharging { transaction_id: i32 },
}

impl Directive {
    /// Render the directive as the outbound OCPP call it becomes on the wire.
    pub fn into_call(self) -> Frame {
        match self {
            Self::StartCharging { id_tag } => Frame::call(
                action::REMOTE_START_TRANSACTION,
                // RemoteStartTransactionRequest serialization cannot fail
                serde_json::to_value(RemoteStartTransactionRequest {
                    id_tag,
                    connector_id: None,
                })
                .unwrap(),
            ),
            Self::StopCharging { transaction_id } => Frame::call(
                action::REMOTE_STOP_TRANSACTION,
                serde_json::to_value(RemoteStopTransactionRequest { transaction_id }).unwrap(),
            ),
        }
    }
}

/// Outcome of a lookup-and-deliver attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryOutcome {
    /// The directive was written to the target connection
    Delivered,
    /// No live session maps to the identifier
    NotConnected,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry backend unavailable: {0}")]
    Backend(String),

    #[error("timed out waiting for directive relay reply")]
    RelayTimeout,
}

impl From<::redis::RedisError> for RegistryError {
    fn from(e: ::redis::RedisError) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Directory of live sessions.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Install or replace the mapping for a charge point. A reconnect
    /// supersedes the previous handle. Returns the connection epoch.
    async fn register(
        &self,
        charge_point_id: &str,
        sender: mpsc::UnboundedSender<String>,
    ) -> Result<u64, RegistryError>;

    /// Remove the mapping only if it still carries `epoch`. Returns whether
    /// this call removed it; `false` means a reconnect superseded the
    /// connection and its cleanup must not touch shared charger state.
    async fn deregister(&self, charge_point_id: &str, epoch: u64) -> Result<bool, RegistryError>;

    /// Forward a directive to the mapped session, wherever it lives.
    async fn lookup_and_deliver(
        &self,
        charge_point_id: &str,
        directive: Directive,
    ) -> Result<DeliveryOutcome, RegistryError>;

    /// Whether a live session maps to the identifier.
    async fn is_connected(&self, charge_point_id: &str) -> Result<bool, RegistryError>;
}

pub type SharedRegistry = Arc<dyn SessionRegistry>;

/// Build the registry backend selected by configuration.
pub async fn build_registry(config: &RegistryConfig) -> Result<SharedRegistry, RegistryError> {
    match config.backend {
        RegistryBackend::Local => Ok(Arc::new(LocalRegistry::new())),
        RegistryBackend::Redis => {
            let registry = RedisRegistry::connect(config).await?;
            Ok(registry)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_directive_becomes_remote_start_call() {
        let frame = Directive::StartCharging {
            id_tag: "TAG1".into(),
        }
        .into_call();
        match frame {
            Frame::Call {
                action, payload, ..
            } => {
                assert_eq!(action, "RemoteStartTransaction");
                assert_eq!(payload["idTag"], "TAG1");
            }
            _ => panic!("expected Call frame"),
        }
    }

    #[test]
    fn stop_directive_becomes_remote_stop_call() {
        let frame = Directive::StopCharging { transaction_id: 42 }.into_call();
        match frame {
            Frame::Call {
                action, payload, ..
            } => {
                assert_eq!(action, "RemoteStopTransaction");
                assert_eq!(payload["transactionId"], 42);
            }
            _ => panic!("expected Call frame"),
        }
    }

    #[test]
    fn directive_serde_roundtrip() {
        let d = Directive::StopCharging { transaction_id: 7 };
        let json = serde_json::to_string(&d).unwrap();
        let back: Directive = serde_json::from_str(&json).unwrap();
        match back {
            Directive::StopCharging { transaction_id } => assert_eq!(transaction_id, 7),
            _ => panic!("wrong variant"),
        }
    }
}

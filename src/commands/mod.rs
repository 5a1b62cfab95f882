//! Command gateway: operator-initiated remote start/stop
//!
//! Sits between the management surface (HTTP API) and the session registry.
//! Before a directive is pushed to a charge point the gateway checks the
//! stored charger state, so an operator gets a meaningful refusal instead
//! of a directive silently ignored by the device.

use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{ChargerStatus, DomainError};
use crate::registry::{
    DeliveryOutcome, Directive, RegistryError, SessionRegistry, SharedRegistry,
};
use crate::storage::{ChargerStore, SharedStore};

/// What happened to a remote command request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Directive delivered to the charge point's live connection
    Accepted,
    /// No live session for the charge point
    NotConnected,
    /// Charger state does not allow the command
    PreconditionFailed,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub struct CommandGateway {
    store: SharedStore,
    registry: SharedRegistry,
}

impl CommandGateway {
    pub fn new(store: SharedStore, registry: SharedRegistry) -> Self {
        Self { store, registry }
    }

    /// Ask a connected, idle charger to start charging for `id_tag`.
    pub async fn request_start(
        &self,
        charge_point_id: &str,
        id_tag: &str,
    ) -> Result<CommandOutcome, CommandError> {
        if !self.registry.is_connected(charge_point_id).await? {
            return Ok(CommandOutcome::NotConnected);
        }

        let charger = match self.store.get_charger(charge_point_id).await? {
            Some(cp) => cp,
            None => return Ok(CommandOutcome::NotConnected),
        };
        if charger.status != ChargerStatus::Available {
            warn!(
                charge_point_id,
                status = %charger.status,
                "Remote start refused; charger not available"
            );
            return Ok(CommandOutcome::PreconditionFailed);
        }

        let outcome = self
            .registry
            .lookup_and_deliver(
                charge_point_id,
                Directive::StartCharging {
                    id_tag: id_tag.to_string(),
                },
            )
            .await?;
        Ok(self.map_delivery(charge_point_id, "start", outcome))
    }

    /// Ask a connected, charging charger to stop its open transaction.
    pub async fn request_stop(&self, charge_point_id: &str) -> Result<CommandOutcome, CommandError> {
        if !self.registry.is_connected(charge_point_id).await? {
            return Ok(CommandOutcome::NotConnected);
        }

        // The open transaction is the precondition; status alone can lag.
        let transaction = match self.store.open_transaction(charge_point_id).await? {
            Some(tx) => tx,
            None => {
                warn!(charge_point_id, "Remote stop refused; no open transaction");
                return Ok(CommandOutcome::PreconditionFailed);
            }
        };

        let outcome = self
            .registry
            .lookup_and_deliver(
                charge_point_id,
                Directive::StopCharging {
                    transaction_id: transaction.id,
                },
            )
            .await?;
        Ok(self.map_delivery(charge_point_id, "stop", outcome))
    }

    fn map_delivery(
        &self,
        charge_point_id: &str,
        kind: &str,
        outcome: DeliveryOutcome,
    ) -> CommandOutcome {
        match outcome {
            DeliveryOutcome::Delivered => {
                info!(charge_point_id, kind, "Remote command delivered");
                CommandOutcome::Accepted
            }
            // Session vanished between the connectivity check and delivery.
            DeliveryOutcome::NotConnected => CommandOutcome::NotConnected,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::{Charger, NewTransaction};
    use crate::registry::{LocalRegistry, SessionRegistry};
    use crate::storage::{InMemoryStore, SharedStore};

    struct Fixture {
        gateway: CommandGateway,
        store: SharedStore,
        registry: Arc<LocalRegistry>,
    }

    fn fixture() -> Fixture {
        let store: SharedStore = Arc::new(InMemoryStore::new());
        let registry = Arc::new(LocalRegistry::new());
        let gateway = CommandGateway::new(store.clone(), registry.clone());
        Fixture {
            gateway,
            store,
            registry,
        }
    }

    async fn connect(f: &Fixture, id: &str) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        f.registry.register(id, tx).await.unwrap();
        rx
    }

    async fn add_charger(f: &Fixture, id: &str, status: ChargerStatus) {
        let mut cp = Charger::new(id);
        cp.status = status;
        f.store.create_charger(cp).await.unwrap();
    }

    #[tokio::test]
    async fn start_on_disconnected_charger() {
        let f = fixture();
        add_charger(&f, "CP-1", ChargerStatus::Offline).await;
        let outcome = f.gateway.request_start("CP-1", "TAG1").await.unwrap();
        assert_eq!(outcome, CommandOutcome::NotConnected);
    }

    #[tokio::test]
    async fn start_delivers_when_available() {
        let f = fixture();
        add_charger(&f, "CP-1", ChargerStatus::Available).await;
        let mut rx = connect(&f, "CP-1").await;

        let outcome = f.gateway.request_start("CP-1", "TAG1").await.unwrap();
        assert_eq!(outcome, CommandOutcome::Accepted);

        let raw = rx.try_recv().unwrap();
        assert!(raw.contains("RemoteStartTransaction"));
        assert!(raw.contains("TAG1"));
    }

    #[tokio::test]
    async fn start_refused_while_charging() {
        let f = fixture();
        add_charger(&f, "CP-1", ChargerStatus::Charging).await;
        let _rx = connect(&f, "CP-1").await;

        let outcome = f.gateway.request_start("CP-1", "TAG1").await.unwrap();
        assert_eq!(outcome, CommandOutcome::PreconditionFailed);
    }

    #[tokio::test]
    async fn stop_requires_open_transaction() {
        let f = fixture();
        add_charger(&f, "CP-1", ChargerStatus::Charging).await;
        let _rx = connect(&f, "CP-1").await;

        let outcome = f.gateway.request_stop("CP-1").await.unwrap();
        assert_eq!(outcome, CommandOutcome::PreconditionFailed);
    }

    #[tokio::test]
    async fn stop_targets_the_open_transaction() {
        let f = fixture();
        add_charger(&f, "CP-1", ChargerStatus::Charging).await;
        let tx = f
            .store
            .create_transaction(NewTransaction {
                charge_point_id: "CP-1".into(),
                id_tag: "TAG1".into(),
                meter_start: 0,
            })
            .await
            .unwrap();
        let mut rx = connect(&f, "CP-1").await;

        let outcome = f.gateway.request_stop("CP-1").await.unwrap();
        assert_eq!(outcome, CommandOutcome::Accepted);

        let raw = rx.try_recv().unwrap();
        assert!(raw.contains("RemoteStopTransaction"));
        assert!(raw.contains(&format!("\"transactionId\":{}", tx.id)));
    }

    #[tokio::test]
    async fn unknown_charger_is_not_connected() {
        let f = fixture();
        let outcome = f.gateway.request_start("CP-404", "TAG1").await.unwrap();
        assert_eq!(outcome, CommandOutcome::NotConnected);
    }
}

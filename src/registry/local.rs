//! In-process session registry

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{DeliveryOutcome, Directive, RegistryError, SessionRegistry};

/// Handle to one live connection.
#[derive(Debug)]
struct SessionHandle {
    epoch: u64,
    sender: mpsc::UnboundedSender<String>,
}

/// Thread-safe registry of live sessions within one process.
pub struct LocalRegistry {
    sessions: DashMap<String, SessionHandle>,
    epoch_counter: AtomicU64,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            epoch_counter: AtomicU64::new(1),
        }
    }

    /// Synchronous register used directly by the Redis backend.
    pub(crate) fn register_sync(
        &self,
        charge_point_id: &str,
        sender: mpsc::UnboundedSender<String>,
    ) -> u64 {
        let epoch = self.epoch_counter.fetch_add(1, Ordering::SeqCst);
        let replaced = self
            .sessions
            .insert(
                charge_point_id.to_string(),
                SessionHandle { epoch, sender },
            )
            .is_some();
        if replaced {
            info!(charge_point_id, epoch, "Session superseded by reconnect");
        } else {
            info!(charge_point_id, epoch, "Session registered");
        }
        epoch
    }

    /// Returns true when the mapping was actually removed.
    pub(crate) fn deregister_sync(&self, charge_point_id: &str, epoch: u64) -> bool {
        let removed = self
            .sessions
            .remove_if(charge_point_id, |_, handle| handle.epoch == epoch)
            .is_some();
        if removed {
            info!(charge_point_id, epoch, "Session deregistered");
        } else {
            warn!(
                charge_point_id,
                epoch, "Stale deregister ignored; session already superseded"
            );
        }
        removed
    }

    pub(crate) fn deliver_sync(
        &self,
        charge_point_id: &str,
        directive: Directive,
    ) -> DeliveryOutcome {
        match self.sessions.get(charge_point_id) {
            Some(handle) => {
                let frame = directive.into_call().serialize();
                if handle.sender.send(frame).is_ok() {
                    DeliveryOutcome::Delivered
                } else {
                    // Channel closed: the connection task is going away.
                    DeliveryOutcome::NotConnected
                }
            }
            None => DeliveryOutcome::NotConnected,
        }
    }

    pub(crate) fn contains(&self, charge_point_id: &str) -> bool {
        self.sessions.contains_key(charge_point_id)
    }
}

impl Default for LocalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionRegistry for LocalRegistry {
    async fn register(
        &self,
        charge_point_id: &str,
        sender: mpsc::UnboundedSender<String>,
    ) -> Result<u64, RegistryError> {
        Ok(self.register_sync(charge_point_id, sender))
    }

    async fn deregister(&self, charge_point_id: &str, epoch: u64) -> Result<bool, RegistryError> {
        Ok(self.deregister_sync(charge_point_id, epoch))
    }

    async fn lookup_and_deliver(
        &self,
        charge_point_id: &str,
        directive: Directive,
    ) -> Result<DeliveryOutcome, RegistryError> {
        Ok(self.deliver_sync(charge_point_id, directive))
    }

    async fn is_connected(&self, charge_point_id: &str) -> Result<bool, RegistryError> {
        Ok(self.contains(charge_point_id))
    }
}

//! Redis-backed session registry for multi-instance deployments
//!
//! Each backend instance keeps its own sessions in an embedded
//! [`LocalRegistry`] and records ownership in Redis under
//! `ocpp:session:{charge_point_id}` = instance id. Directives for sessions
//! owned by another instance are relayed over that instance's pub/sub
//! channel; the relay reply comes back on a per-request channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::{DeliveryOutcome, Directive, LocalRegistry, RegistryError, SessionRegistry};
use crate::config::RegistryConfig;

const OWNER_KEY_PREFIX: &str = "ocpp:session:";
const DIRECTIVE_CHANNEL_PREFIX: &str = "ocpp:directives:";
const REPLY_CHANNEL_PREFIX: &str = "ocpp:reply:";

/// A directive relayed to the instance owning the target session.
#[derive(Debug, Serialize, Deserialize)]
struct RelayRequest {
    request_id: String,
    charge_point_id: String,
    directive: Directive,
}

pub struct RedisRegistry {
    instance_id: String,
    local: Arc<LocalRegistry>,
    client: redis::Client,
    conn: ConnectionManager,
    reply_timeout: Duration,
}

impl RedisRegistry {
    /// Connect to Redis and start this instance's relay listener.
    pub async fn connect(config: &RegistryConfig) -> Result<Arc<Self>, RegistryError> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let conn = client.get_connection_manager().await?;
        let instance_id = uuid::Uuid::new_v4().to_string();
        info!(instance_id, "Redis session registry connected");

        let registry = Arc::new(Self {
            instance_id,
            local: Arc::new(LocalRegistry::new()),
            client,
            conn,
            reply_timeout: Duration::from_secs(config.reply_timeout),
        });

        registry.spawn_relay_listener().await?;
        Ok(registry)
    }

    fn owner_key(charge_point_id: &str) -> String {
        format!("{OWNER_KEY_PREFIX}{charge_point_id}")
    }

    fn directive_channel(instance_id: &str) -> String {
        format!("{DIRECTIVE_CHANNEL_PREFIX}{instance_id}")
    }

    fn reply_channel(request_id: &str) -> String {
        format!("{REPLY_CHANNEL_PREFIX}{request_id}")
    }

    /// Subscribe to this instance's directive channel and serve relayed
    /// directives against the embedded local registry.
    async fn spawn_relay_listener(self: &Arc<Self>) -> Result<(), RegistryError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub
            .subscribe(Self::directive_channel(&self.instance_id))
            .await?;

        let local = self.local.clone();
        let mut conn = self.conn.clone();
        tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "Discarding non-text relay message");
                        continue;
                    }
                };
                let request: RelayRequest = match serde_json::from_str(&payload) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "Discarding malformed relay request");
                        continue;
                    }
                };

                let outcome = local.deliver_sync(&request.charge_point_id, request.directive);
                let reply = serde_json::to_string(&outcome).unwrap();
                let publish: Result<i64, _> = conn
                    .publish(Self::reply_channel(&request.request_id), reply)
                    .await;
                if let Err(e) = publish {
                    error!(error = %e, request_id = request.request_id.as_str(),
                        "Failed to publish relay reply");
                }
            }
            info!("Relay listener stopped");
        });
        Ok(())
    }

    /// Relay a directive to the remote instance owning the session.
    async fn relay(
        &self,
        owner: &str,
        charge_point_id: &str,
        directive: Directive,
    ) -> Result<DeliveryOutcome, RegistryError> {
        let request_id = uuid::Uuid::new_v4().to_string();

        // Subscribe to the reply channel before publishing, so the reply
        // cannot slip past us.
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(Self::reply_channel(&request_id)).await?;

        let request = RelayRequest {
            request_id: request_id.clone(),
            charge_point_id: charge_point_id.to_string(),
            directive,
        };
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .publish(
                Self::directive_channel(owner),
                serde_json::to_string(&request).unwrap(),
            )
            .await?;

        let mut stream = pubsub.into_on_message();
        let msg = tokio::time::timeout(self.reply_timeout, stream.next())
            .await
            .map_err(|_| RegistryError::RelayTimeout)?
            .ok_or(RegistryError::RelayTimeout)?;

        let payload: String = msg.get_payload()?;
        serde_json::from_str(&payload)
            .map_err(|e| RegistryError::Backend(format!("malformed relay reply: {e}")))
    }
}

#[async_trait]
impl SessionRegistry for RedisRegistry {
    async fn register(
        &self,
        charge_point_id: &str,
        sender: mpsc::UnboundedSender<String>,
    ) -> Result<u64, RegistryError> {
        let epoch = self.local.register_sync(charge_point_id, sender);
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(Self::owner_key(charge_point_id), &self.instance_id)
            .await?;
        Ok(epoch)
    }

    async fn deregister(&self, charge_point_id: &str, epoch: u64) -> Result<bool, RegistryError> {
        if !self.local.deregister_sync(charge_point_id, epoch) {
            // Superseded locally; ownership already belongs to the newer
            // connection (possibly on another instance).
            return Ok(false);
        }

        let key = Self::owner_key(charge_point_id);
        let mut conn = self.conn.clone();
        let owner: Option<String> = conn.get(&key).await?;
        if owner.as_deref() == Some(self.instance_id.as_str()) {
            let _: () = conn.del(&key).await?;
        }
        Ok(true)
    }

    async fn lookup_and_deliver(
        &self,
        charge_point_id: &str,
        directive: Directive,
    ) -> Result<DeliveryOutcome, RegistryError> {
        if self.local.contains(charge_point_id) {
            return Ok(self.local.deliver_sync(charge_point_id, directive));
        }

        let mut conn = self.conn.clone();
        let owner: Option<String> = conn.get(Self::owner_key(charge_point_id)).await?;
        match owner {
            None => Ok(DeliveryOutcome::NotConnected),
            Some(owner) if owner == self.instance_id => {
                // Key left behind by an unclean shutdown of this instance.
                let _: () = conn.del(Self::owner_key(charge_point_id)).await?;
                Ok(DeliveryOutcome::NotConnected)
            }
            Some(owner) => self.relay(&owner, charge_point_id, directive).await,
        }
    }

    async fn is_connected(&self, charge_point_id: &str) -> Result<bool, RegistryError> {
        if self.local.contains(charge_point_id) {
            return Ok(true);
        }
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(Self::owner_key(charge_point_id)).await?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_request_serde_roundtrip() {
        let request = RelayRequest {
            request_id: "req-1".into(),
            charge_point_id: "CP-1".into(),
            directive: Directive::StartCharging {
                id_tag: "TAG1".into(),
            },
        };
        let json = serde_json::to_string(&request).unwrap();
        let back: RelayRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.request_id, "req-1");
        assert_eq!(back.charge_point_id, "CP-1");
        assert!(matches!(back.directive, Directive::StartCharging { .. }));
    }

    #[test]
    fn key_and_channel_layout() {
        assert_eq!(RedisRegistry::owner_key("CP-1"), "ocpp:session:CP-1");
        assert_eq!(
            RedisRegistry::directive_channel("inst-a"),
            "ocpp:directives:inst-a"
        );
        assert_eq!(RedisRegistry::reply_channel("req-1"), "ocpp:reply:req-1");
    }
}

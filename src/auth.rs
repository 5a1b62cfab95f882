//! Pluggable id-tag authorization
//!
//! The session layer consults an [`AuthorizationService`] for Authorize and
//! StartTransaction calls. The default policy accepts every non-empty tag;
//! deployments with an allow-list supply their own implementation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::messages::AuthorizationStatus;

#[async_trait]
pub trait AuthorizationService: Send + Sync {
    async fn authorize(&self, id_tag: &str) -> AuthorizationStatus;
}

pub type SharedAuthorizer = Arc<dyn AuthorizationService>;

/// Accepts every non-empty id tag.
pub struct AcceptAllAuthorizer;

#[async_trait]
impl AuthorizationService for AcceptAllAuthorizer {
    async fn authorize(&self, id_tag: &str) -> AuthorizationStatus {
        if id_tag.is_empty() {
            AuthorizationStatus::Invalid
        } else {
            AuthorizationStatus::Accepted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accept_all_rejects_only_empty_tags() {
        let auth = AcceptAllAuthorizer;
        assert_eq!(auth.authorize("TAG1").await, AuthorizationStatus::Accepted);
        assert_eq!(auth.authorize("").await, AuthorizationStatus::Invalid);
    }
}

//! Authorize: id-tag check without starting a transaction

use tracing::info;

use crate::auth::AuthorizationService;
use crate::protocol::messages::{AuthorizeRequest, AuthorizeResponse, IdTagInfo};
use crate::protocol::Frame;
use crate::session::{ChargerSession, SessionError};

impl ChargerSession {
    pub(crate) async fn handle_authorize(
        &mut self,
        unique_id: &str,
        payload: serde_json::Value,
    ) -> Result<Frame, SessionError> {
        let request: AuthorizeRequest = serde_json::from_value(payload)?;

        let status = self.authorizer.authorize(&request.id_tag).await;
        info!(
            charge_point_id = self.charge_point_id.as_str(),
            id_tag = request.id_tag.as_str(),
            status = ?status,
            "Authorize"
        );

        let response = AuthorizeResponse {
            id_tag_info: IdTagInfo::new(status),
        };
        Ok(Frame::result(
            unique_id,
            serde_json::to_value(response).unwrap(),
        ))
    }
}

//! HTTP management surface
//!
//! Small operator-facing API in front of the command gateway:
//!
//! - `POST /api/v1/charge-points/{charge_point_id}/remote-start`
//! - `POST /api/v1/charge-points/{charge_point_id}/remote-stop`
//! - `GET  /api/v1/health`
//!
//! Command outcomes map onto status codes: delivered is 200, no live
//! session is 404, and a charger state that forbids the command is 409.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::commands::{CommandError, CommandGateway, CommandOutcome};
use crate::registry::RegistryError;

pub fn router(gateway: Arc<CommandGateway>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route(
            "/api/v1/charge-points/{charge_point_id}/remote-start",
            post(remote_start),
        )
        .route(
            "/api/v1/charge-points/{charge_point_id}/remote-stop",
            post(remote_stop),
        )
        .with_state(gateway)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteStartBody {
    id_tag: String,
}

#[derive(Debug, Serialize)]
struct CommandReply {
    status: &'static str,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn remote_start(
    State(gateway): State<Arc<CommandGateway>>,
    Path(charge_point_id): Path<String>,
    Json(body): Json<RemoteStartBody>,
) -> Response {
    if body.id_tag.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "error": "idTag must not be empty" })),
        )
            .into_response();
    }
    let result = gateway.request_start(&charge_point_id, &body.id_tag).await;
    command_response(&charge_point_id, result)
}

async fn remote_stop(
    State(gateway): State<Arc<CommandGateway>>,
    Path(charge_point_id): Path<String>,
) -> Response {
    let result = gateway.request_stop(&charge_point_id).await;
    command_response(&charge_point_id, result)
}

fn command_response(
    charge_point_id: &str,
    result: Result<CommandOutcome, CommandError>,
) -> Response {
    match result {
        Ok(CommandOutcome::Accepted) => {
            (StatusCode::OK, Json(CommandReply { status: "Accepted" })).into_response()
        }
        Ok(CommandOutcome::NotConnected) => (
            StatusCode::NOT_FOUND,
            Json(CommandReply {
                status: "NotConnected",
            }),
        )
            .into_response(),
        Ok(CommandOutcome::PreconditionFailed) => (
            StatusCode::CONFLICT,
            Json(CommandReply {
                status: "PreconditionFailed",
            }),
        )
            .into_response(),
        Err(CommandError::Registry(RegistryError::RelayTimeout)) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(serde_json::json!({ "error": "directive relay timed out" })),
        )
            .into_response(),
        Err(e) => {
            error!(charge_point_id, error = %e, "Command failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "internal error" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::{Charger, ChargerStatus};
    use crate::registry::{LocalRegistry, SessionRegistry};
    use crate::storage::{ChargerStore, InMemoryStore};

    async fn gateway_with_available_charger() -> (Arc<CommandGateway>, mpsc::UnboundedReceiver<String>)
    {
        let store = Arc::new(InMemoryStore::new());
        let registry = Arc::new(LocalRegistry::new());

        let mut cp = Charger::new("CP-1");
        cp.status = ChargerStatus::Available;
        store.create_charger(cp).await.unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register("CP-1", tx).await.unwrap();

        (Arc::new(CommandGateway::new(store, registry)), rx)
    }

    #[tokio::test]
    async fn remote_start_accepted() {
        let (gateway, mut rx) = gateway_with_available_charger().await;

        let response = remote_start(
            State(gateway),
            Path("CP-1".to_string()),
            Json(RemoteStartBody {
                id_tag: "TAG1".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(rx.try_recv().unwrap().contains("RemoteStartTransaction"));
    }

    #[tokio::test]
    async fn remote_start_unknown_charger_is_404() {
        let (gateway, _rx) = gateway_with_available_charger().await;

        let response = remote_start(
            State(gateway),
            Path("CP-404".to_string()),
            Json(RemoteStartBody {
                id_tag: "TAG1".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn remote_start_rejects_blank_tag() {
        let (gateway, _rx) = gateway_with_available_charger().await;

        let response = remote_start(
            State(gateway),
            Path("CP-1".to_string()),
            Json(RemoteStartBody { id_tag: "  ".into() }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn remote_stop_without_open_transaction_is_409() {
        let (gateway, _rx) = gateway_with_available_charger().await;

        let response = remote_stop(State(gateway), Path("CP-1".to_string())).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}

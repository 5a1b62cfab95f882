//! WebSocket server for OCPP connections
//!
//! Accepts charge point connections on `ws://host:port/ocpp/{id}`,
//! negotiates the `ocpp1.6` subprotocol, and drives one
//! [`ChargerSession`](crate::session::ChargerSession) per connection.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::auth::SharedAuthorizer;
use crate::config::ServerConfig;
use crate::registry::{SessionRegistry, SharedRegistry};
use crate::session::ChargerSession;
use crate::storage::{ChargerStore, SharedStore};

use super::shutdown::ShutdownSignal;

/// OCPP 1.6 WebSocket subprotocol
const OCPP_SUBPROTOCOL: &str = "ocpp1.6";

pub struct OcppServer {
    config: ServerConfig,
    store: SharedStore,
    authorizer: SharedAuthorizer,
    registry: SharedRegistry,
    shutdown: Option<ShutdownSignal>,
}

impl OcppServer {
    pub fn new(
        config: ServerConfig,
        store: SharedStore,
        authorizer: SharedAuthorizer,
        registry: SharedRegistry,
    ) -> Self {
        Self {
            config,
            store,
            authorizer,
            registry,
            shutdown: None,
        }
    }

    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Bind and serve until an accept error or shutdown.
    pub async fn run(&self) -> std::io::Result<()> {
        let addr = self.config.ws_address();
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = addr.as_str(), "OCPP WebSocket server listening");

        match self.shutdown.clone() {
            Some(signal) => self.run_with_shutdown(listener, signal).await,
            None => self.run_loop(listener).await,
        }
    }

    async fn run_loop(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            self.spawn_connection(stream, peer);
        }
    }

    async fn run_with_shutdown(
        &self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> std::io::Result<()> {
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer),
                        Err(e) => error!(error = %e, "Failed to accept connection"),
                    }
                }
                _ = shutdown.wait() => {
                    info!("WebSocket server shutting down");
                    return Ok(());
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let store = self.store.clone();
        let authorizer = self.authorizer.clone();
        let registry = self.registry.clone();
        let heartbeat_interval = self.config.heartbeat_interval;
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(
                stream,
                peer,
                store,
                authorizer,
                registry,
                heartbeat_interval,
                shutdown,
            )
            .await
            {
                warn!(peer = %peer, error = %e, "Connection ended with error");
            }
        });
    }
}

/// Extract the charge point id from the request path.
///
/// Accepts `/ocpp/{id}` and bare `/{id}`.
fn extract_charge_point_id(path: &str) -> Option<String> {
    let path = path.trim_start_matches('/');

    if let Some(id) = path.strip_prefix("ocpp/") {
        let id = id.trim_start_matches('/');
        if !id.is_empty() && !id.contains('/') {
            return Some(id.to_string());
        }
        return None;
    }

    if !path.is_empty() && !path.contains('/') {
        return Some(path.to_string());
    }

    None
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    store: SharedStore,
    authorizer: SharedAuthorizer,
    registry: SharedRegistry,
    heartbeat_interval: u32,
    shutdown: Option<ShutdownSignal>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut charge_point_id: Option<String> = None;

    let ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &Request, mut response: Response| {
            let path = req.uri().path();
            debug!(peer = %peer, path, "WebSocket handshake");

            let requested_protocols = req
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");

            let supports_ocpp16 = requested_protocols
                .split(',')
                .map(str::trim)
                .any(|p| p == OCPP_SUBPROTOCOL);

            if supports_ocpp16 {
                // parse of a fixed valid token cannot fail
                response.headers_mut().insert(
                    "Sec-WebSocket-Protocol",
                    OCPP_SUBPROTOCOL.parse().unwrap(),
                );
            } else if !requested_protocols.is_empty() {
                warn!(
                    peer = %peer,
                    requested = requested_protocols,
                    "Client did not offer ocpp1.6; accepting anyway"
                );
            }

            match extract_charge_point_id(path) {
                Some(id) => {
                    charge_point_id = Some(id);
                    Ok(response)
                }
                None => {
                    warn!(peer = %peer, path, "Rejecting connection without charge point id");
                    let mut reject = ErrorResponse::new(Some(
                        "missing charge point id in path".to_string(),
                    ));
                    *reject.status_mut() = StatusCode::BAD_REQUEST;
                    Err(reject)
                }
            }
        },
    )
    .await?;

    // Set by the handshake callback on every accepted connection
    let charge_point_id = match charge_point_id {
        Some(id) => id,
        None => return Ok(()),
    };
    info!(charge_point_id = charge_point_id.as_str(), peer = %peer, "Charge point connected");

    let mut session = ChargerSession::new(
        charge_point_id.clone(),
        store,
        authorizer,
        heartbeat_interval,
    );
    if let Err(e) = session.initialize().await {
        error!(
            charge_point_id = charge_point_id.as_str(),
            error = %e,
            "Refusing connection; charger record unavailable"
        );
        return Ok(());
    }

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // All outbound frames (replies and pushed directives) go through one
    // channel, so they are written in a single order.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let epoch = registry.register(&charge_point_id, tx.clone()).await?;

    let cp_id_send = charge_point_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            debug!(charge_point_id = cp_id_send.as_str(), frame = msg.as_str(), "->");
            if let Err(e) = ws_sender.send(Message::Text(msg)).await {
                warn!(charge_point_id = cp_id_send.as_str(), error = %e, "Send failed");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let cp_id_recv = charge_point_id.clone();
    let registry_recv = registry.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    debug!(charge_point_id = cp_id_recv.as_str(), frame = text.as_str(), "<-");
                    if let Some(reply) = session.handle_message(&text).await {
                        if tx.send(reply).is_err() {
                            break;
                        }
                    }
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Pong replies are handled by tungstenite itself
                }
                Ok(Message::Close(frame)) => {
                    debug!(charge_point_id = cp_id_recv.as_str(), ?frame, "Close frame");
                    break;
                }
                Ok(Message::Binary(data)) => {
                    warn!(
                        charge_point_id = cp_id_recv.as_str(),
                        bytes = data.len(),
                        "Ignoring binary message"
                    );
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    warn!(charge_point_id = cp_id_recv.as_str(), error = %e, "WebSocket error");
                    break;
                }
            }
        }
        finish_connection(session, &registry_recv, epoch).await;
    });

    if let Some(shutdown) = shutdown {
        tokio::select! {
            _ = send_task => {}
            _ = recv_task => {}
            _ = shutdown.notified().wait() => {
                info!(
                    charge_point_id = charge_point_id.as_str(),
                    "Closing connection for server shutdown"
                );
            }
        }
    } else {
        tokio::select! {
            _ = send_task => {}
            _ = recv_task => {}
        }
    }

    info!(charge_point_id = charge_point_id.as_str(), "Charge point disconnected");
    Ok(())
}

/// End-of-connection cleanup: deregister with this connection's epoch and
/// write the offline status only when the mapping was still ours. A
/// reconnect supersedes the epoch, and a superseded connection's late
/// cleanup must not clobber the live session's charger state.
async fn finish_connection(session: ChargerSession, registry: &SharedRegistry, epoch: u64) {
    match registry.deregister(session.charge_point_id(), epoch).await {
        Ok(true) => session.on_disconnect().await,
        Ok(false) => {
            debug!(
                charge_point_id = session.charge_point_id(),
                epoch, "Connection superseded; skipping offline write"
            );
        }
        Err(e) => {
            // The local mapping is gone even when the backend write fails.
            warn!(
                charge_point_id = session.charge_point_id(),
                error = %e,
                "Deregister failed"
            );
            session.on_disconnect().await;
        }
    }
}

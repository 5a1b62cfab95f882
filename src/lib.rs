//! # OCPP Charge-Point Backend
//!
//! OCPP 1.6 central system for managing EV charging stations over
//! persistent WebSocket connections.
//!
//! ## Architecture
//!
//! - **domain**: Core business entities and error types
//! - **protocol**: OCPP-J framing and typed call/result payloads
//! - **storage**: Charger/transaction record store (in-memory and SeaORM)
//! - **session**: Per-connection session state machine and call routing
//! - **registry**: Directory of live sessions (local and Redis-backed)
//! - **commands**: Remote start/stop command gateway
//! - **server**: WebSocket server and graceful shutdown
//! - **api**: Admin HTTP surface for the command gateway

pub mod api;
pub mod auth;
pub mod commands;
pub mod config;
pub mod domain;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod storage;

pub use config::{default_config_path, AppConfig};
pub use storage::database::{init_database, SeaOrmStore};
pub use storage::{ChargerStore, InMemoryStore, SharedStore};

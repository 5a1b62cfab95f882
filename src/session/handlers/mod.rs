//! One handler per inbound OCPP action

mod authorize;
mod boot_notification;
mod heartbeat;
mod start_transaction;
mod stop_transaction;

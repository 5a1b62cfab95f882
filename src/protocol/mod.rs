//! OCPP-J wire protocol
//!
//! Pure, stateless codec: [`frame`] handles the transport envelope shared by
//! all OCPP versions, [`messages`] carries the typed payloads for the
//! OCPP 1.6 action subset this backend speaks.

pub mod frame;
pub mod messages;

pub use frame::{Frame, FrameError};

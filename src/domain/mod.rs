//! Core business entities and types

mod charger;
mod error;
mod transaction;

pub use charger::{Charger, ChargerStatus};
pub use error::{DomainError, DomainResult};
pub use transaction::{NewTransaction, Transaction};

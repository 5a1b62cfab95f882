//! Charger and transaction record store
//!
//! The session layer talks to a [`ChargerStore`] trait; two implementations
//! exist: [`InMemoryStore`] for tests and single-binary development, and
//! [`database::SeaOrmStore`] for durable deployments.

pub mod database;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Charger, ChargerStatus, DomainResult, NewTransaction, Transaction};

pub use memory::InMemoryStore;

/// Storage trait for persistence operations.
///
/// Single-record operations are atomic; no cross-record transaction is
/// promised. `create_transaction` enforces the at-most-one-open-per-charger
/// invariant so racing starts resolve to exactly one winner.
#[async_trait]
pub trait ChargerStore: Send + Sync {
    // Charger operations
    async fn get_charger(&self, id: &str) -> DomainResult<Option<Charger>>;
    async fn create_charger(&self, charger: Charger) -> DomainResult<Charger>;
    async fn update_charger(&self, charger: Charger) -> DomainResult<()>;
    async fn update_charger_status(&self, id: &str, status: ChargerStatus) -> DomainResult<()>;

    // Transaction operations
    async fn create_transaction(&self, new: NewTransaction) -> DomainResult<Transaction>;
    async fn get_transaction(&self, id: i32) -> DomainResult<Option<Transaction>>;
    async fn update_transaction(&self, transaction: Transaction) -> DomainResult<()>;
    /// The single open transaction for a charger, if any.
    async fn open_transaction(&self, charge_point_id: &str) -> DomainResult<Option<Transaction>>;
    /// All transactions for a charger, newest first.
    async fn transactions_for_charger(
        &self,
        charge_point_id: &str,
    ) -> DomainResult<Vec<Transaction>>;
}

/// Thread-safe shared store handle
pub type SharedStore = Arc<dyn ChargerStore>;

//! In-memory storage implementation

use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::ChargerStore;
use crate::domain::{
    Charger, ChargerStatus, DomainError, DomainResult, NewTransaction, Transaction,
};

/// In-memory store for development and testing
pub struct InMemoryStore {
    chargers: DashMap<String, Charger>,
    transactions: DashMap<i32, Transaction>,
    /// charge_point_id → id of its open transaction; the entry lock makes
    /// the one-open-per-charger check-and-create atomic.
    open_by_charger: DashMap<String, i32>,
    transaction_counter: AtomicI32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chargers: DashMap::new(),
            transactions: DashMap::new(),
            open_by_charger: DashMap::new(),
            transaction_counter: AtomicI32::new(1),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChargerStore for InMemoryStore {
    async fn get_charger(&self, id: &str) -> DomainResult<Option<Charger>> {
        Ok(self.chargers.get(id).map(|cp| cp.clone()))
    }

    async fn create_charger(&self, charger: Charger) -> DomainResult<Charger> {
        if self.chargers.contains_key(&charger.id) {
            return Err(DomainError::Validation(format!(
                "charger {} already exists",
                charger.id
            )));
        }
        self.chargers.insert(charger.id.clone(), charger.clone());
        Ok(charger)
    }

    async fn update_charger(&self, mut charger: Charger) -> DomainResult<()> {
        if !self.chargers.contains_key(&charger.id) {
            return Err(DomainError::ChargerNotFound(charger.id));
        }
        charger.updated_at = Some(Utc::now());
        self.chargers.insert(charger.id.clone(), charger);
        Ok(())
    }

    async fn update_charger_status(&self, id: &str, status: ChargerStatus) -> DomainResult<()> {
        match self.chargers.get_mut(id) {
            Some(mut cp) => {
                cp.status = status;
                cp.updated_at = Some(Utc::now());
                Ok(())
            }
            None => Err(DomainError::ChargerNotFound(id.to_string())),
        }
    }

    async fn create_transaction(&self, new: NewTransaction) -> DomainResult<Transaction> {
        let id = match self.open_by_charger.entry(new.charge_point_id.clone()) {
            Entry::Occupied(open) => {
                return Err(DomainError::TransactionAlreadyOpen {
                    charge_point_id: new.charge_point_id,
                    transaction_id: *open.get(),
                });
            }
            Entry::Vacant(slot) => {
                let id = self.transaction_counter.fetch_add(1, Ordering::SeqCst);
                slot.insert(id);
                id
            }
        };

        let transaction = Transaction {
            id,
            charge_point_id: new.charge_point_id,
            id_tag: new.id_tag,
            meter_start: new.meter_start,
            meter_stop: None,
            started_at: Utc::now(),
            stopped_at: None,
            stop_reason: None,
        };
        self.transactions.insert(id, transaction.clone());
        Ok(transaction)
    }

    async fn get_transaction(&self, id: i32) -> DomainResult<Option<Transaction>> {
        Ok(self.transactions.get(&id).map(|t| t.clone()))
    }

    async fn update_transaction(&self, transaction: Transaction) -> DomainResult<()> {
        if !self.transactions.contains_key(&transaction.id) {
            return Err(DomainError::TransactionNotFound(transaction.id));
        }
        if !transaction.is_open() {
            self.open_by_charger
                .remove_if(&transaction.charge_point_id, |_, open_id| {
                    *open_id == transaction.id
                });
        }
        self.transactions.insert(transaction.id, transaction);
        Ok(())
    }

    async fn open_transaction(&self, charge_point_id: &str) -> DomainResult<Option<Transaction>> {
        let id = match self.open_by_charger.get(charge_point_id) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.transactions.get(&id).map(|t| t.clone()))
    }

    async fn transactions_for_charger(
        &self,
        charge_point_id: &str,
    ) -> DomainResult<Vec<Transaction>> {
        let mut txs: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| t.charge_point_id == charge_point_id)
            .map(|t| t.clone())
            .collect();
        txs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(txs)
    }
}

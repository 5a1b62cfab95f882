//! SeaORM implementation of [`ChargerStore`]

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set,
};

use super::entities::{charger, transaction};
use crate::domain::{
    Charger, ChargerStatus, DomainError, DomainResult, NewTransaction, Transaction,
};
use crate::storage::ChargerStore;

pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ─────────────────────────────────────────

fn charger_from_model(model: charger::Model) -> Charger {
    Charger {
        id: model.id,
        status: ChargerStatus::from(model.status.as_str()),
        last_heartbeat: model.last_heartbeat,
        vendor: model.vendor,
        model: model.model,
        serial_number: model.serial_number,
        firmware_version: model.firmware_version,
        registered_at: model.registered_at,
        updated_at: model.updated_at,
    }
}

fn transaction_from_model(model: transaction::Model) -> Transaction {
    Transaction {
        id: model.id,
        charge_point_id: model.charge_point_id,
        id_tag: model.id_tag,
        meter_start: model.meter_start,
        meter_stop: model.meter_stop,
        started_at: model.started_at,
        stopped_at: model.stopped_at,
        stop_reason: model.stop_reason,
    }
}

#[async_trait]
impl ChargerStore for SeaOrmStore {
    async fn get_charger(&self, id: &str) -> DomainResult<Option<Charger>> {
        let model = charger::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(charger_from_model))
    }

    async fn create_charger(&self, cp: Charger) -> DomainResult<Charger> {
        let model = charger::ActiveModel {
            id: Set(cp.id.clone()),
            status: Set(cp.status.to_string()),
            last_heartbeat: Set(cp.last_heartbeat),
            vendor: Set(cp.vendor.clone()),
            model: Set(cp.model.clone()),
            serial_number: Set(cp.serial_number.clone()),
            firmware_version: Set(cp.firmware_version.clone()),
            registered_at: Set(cp.registered_at),
            updated_at: Set(cp.updated_at),
        };
        let inserted = model.insert(&self.db).await?;
        Ok(charger_from_model(inserted))
    }

    async fn update_charger(&self, cp: Charger) -> DomainResult<()> {
        let existing = charger::Entity::find_by_id(&cp.id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::ChargerNotFound(cp.id.clone()))?;

        let mut model: charger::ActiveModel = existing.into();
        model.status = Set(cp.status.to_string());
        model.last_heartbeat = Set(cp.last_heartbeat);
        model.vendor = Set(cp.vendor);
        model.model = Set(cp.model);
        model.serial_number = Set(cp.serial_number);
        model.firmware_version = Set(cp.firmware_version);
        model.updated_at = Set(Some(Utc::now()));
        model.update(&self.db).await?;
        Ok(())
    }

    async fn update_charger_status(&self, id: &str, status: ChargerStatus) -> DomainResult<()> {
        let existing = charger::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DomainError::ChargerNotFound(id.to_string()))?;

        let mut model: charger::ActiveModel = existing.into();
        model.status = Set(status.to_string());
        model.updated_at = Set(Some(Utc::now()));
        model.update(&self.db).await?;
        Ok(())
    }

    async fn create_transaction(&self, new: NewTransaction) -> DomainResult<Transaction> {
        // The owning connection serializes its own calls, so a plain
        // check-then-insert is enough here; racing starts from the same
        // charger cannot interleave within one session.
        if let Some(open) = self.open_transaction(&new.charge_point_id).await? {
            return Err(DomainError::TransactionAlreadyOpen {
                charge_point_id: new.charge_point_id,
                transaction_id: open.id,
            });
        }

        let model = transaction::ActiveModel {
            id: NotSet,
            charge_point_id: Set(new.charge_point_id),
            id_tag: Set(new.id_tag),
            meter_start: Set(new.meter_start),
            meter_stop: Set(None),
            started_at: Set(Utc::now()),
            stopped_at: Set(None),
            stop_reason: Set(None),
        };
        let inserted = model.insert(&self.db).await?;
        Ok(transaction_from_model(inserted))
    }

    async fn get_transaction(&self, id: i32) -> DomainResult<Option<Transaction>> {
        let model = transaction::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(transaction_from_model))
    }

    async fn update_transaction(&self, tx: Transaction) -> DomainResult<()> {
        let existing = transaction::Entity::find_by_id(tx.id)
            .one(&self.db)
            .await?
            .ok_or(DomainError::TransactionNotFound(tx.id))?;

        let mut model: transaction::ActiveModel = existing.into();
        model.meter_stop = Set(tx.meter_stop);
        model.stopped_at = Set(tx.stopped_at);
        model.stop_reason = Set(tx.stop_reason);
        model.update(&self.db).await?;
        Ok(())
    }

    async fn open_transaction(&self, charge_point_id: &str) -> DomainResult<Option<Transaction>> {
        let model = transaction::Entity::find()
            .filter(transaction::Column::ChargePointId.eq(charge_point_id))
            .filter(transaction::Column::StoppedAt.is_null())
            .one(&self.db)
            .await?;
        Ok(model.map(transaction_from_model))
    }

    async fn transactions_for_charger(
        &self,
        charge_point_id: &str,
    ) -> DomainResult<Vec<Transaction>> {
        let models = transaction::Entity::find()
            .filter(transaction::Column::ChargePointId.eq(charge_point_id))
            .order_by_desc(transaction::Column::StartedAt)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(transaction_from_model).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::migrator::Migrator;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    async fn sqlite_store() -> SeaOrmStore {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        SeaOrmStore::new(db)
    }

    #[tokio::test]
    async fn charger_crud_roundtrip() {
        let store = sqlite_store().await;

        let mut cp = Charger::new("CP-1");
        cp.vendor = Some("Acme".into());
        store.create_charger(cp).await.unwrap();

        let mut loaded = store.get_charger("CP-1").await.unwrap().unwrap();
        assert_eq!(loaded.vendor.as_deref(), Some("Acme"));
        assert_eq!(loaded.status, ChargerStatus::Connected);

        loaded.model = Some("X1".into());
        loaded.status = ChargerStatus::Available;
        store.update_charger(loaded).await.unwrap();

        let reloaded = store.get_charger("CP-1").await.unwrap().unwrap();
        assert_eq!(reloaded.model.as_deref(), Some("X1"));
        assert_eq!(reloaded.status, ChargerStatus::Available);
        assert!(reloaded.updated_at.is_some());
    }

    #[tokio::test]
    async fn transaction_lifecycle_and_open_invariant() {
        let store = sqlite_store().await;
        store.create_charger(Charger::new("CP-1")).await.unwrap();

        let tx = store
            .create_transaction(NewTransaction {
                charge_point_id: "CP-1".into(),
                id_tag: "TAG1".into(),
                meter_start: 100,
            })
            .await
            .unwrap();
        assert!(tx.is_open());

        // Second open transaction on the same charger is rejected.
        let err = store
            .create_transaction(NewTransaction {
                charge_point_id: "CP-1".into(),
                id_tag: "TAG2".into(),
                meter_start: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::TransactionAlreadyOpen { .. }));

        let mut closed = tx.clone();
        closed.stop(150, Some("Local".into()));
        store.update_transaction(closed).await.unwrap();

        assert!(store.open_transaction("CP-1").await.unwrap().is_none());
        let stored = store.get_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(stored.meter_stop, Some(150));
        assert_eq!(stored.stop_reason.as_deref(), Some("Local"));
    }
}

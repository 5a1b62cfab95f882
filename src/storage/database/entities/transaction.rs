//! Transaction entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub charge_point_id: String,
    pub id_tag: String,

    /// Meter reading at start (Wh)
    pub meter_start: i32,

    /// Meter reading at stop (Wh); set when the transaction closes
    #[sea_orm(nullable)]
    pub meter_stop: Option<i32>,

    pub started_at: DateTimeUtc,

    /// A transaction is open while this is null
    #[sea_orm(nullable)]
    pub stopped_at: Option<DateTimeUtc>,

    /// Reason reported by the charge point: EVDisconnected, Local, Remote, ...
    #[sea_orm(nullable)]
    pub stop_reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::charger::Entity",
        from = "Column::ChargePointId",
        to = "super::charger::Column::Id"
    )]
    Charger,
}

impl Related<super::charger::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Charger.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

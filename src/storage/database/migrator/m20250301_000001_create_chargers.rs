//! Create chargers table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Chargers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Chargers::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Chargers::Status)
                            .string()
                            .not_null()
                            .default("Offline"),
                    )
                    .col(ColumnDef::new(Chargers::LastHeartbeat).timestamp_with_time_zone())
                    .col(ColumnDef::new(Chargers::Vendor).string())
                    .col(ColumnDef::new(Chargers::Model).string())
                    .col(ColumnDef::new(Chargers::SerialNumber).string())
                    .col(ColumnDef::new(Chargers::FirmwareVersion).string())
                    .col(
                        ColumnDef::new(Chargers::RegisteredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Chargers::UpdatedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Chargers::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Chargers {
    Table,
    Id,
    Status,
    LastHeartbeat,
    Vendor,
    Model,
    SerialNumber,
    FirmwareVersion,
    RegisteredAt,
    UpdatedAt,
}

//! SeaORM-backed durable store

pub mod entities;
pub mod migrator;
mod store;

use sea_orm::{Database, DatabaseConnection};
use tracing::info;

pub use store::SeaOrmStore;

/// Initialize database connection
pub async fn init_database(url: &str) -> Result<DatabaseConnection, sea_orm::DbErr> {
    info!("Connecting to database: {}", url);
    let db = Database::connect(url).await?;
    info!("Database connected");
    Ok(db)
}

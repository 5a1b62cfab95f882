pub mod charger;
pub mod transaction;

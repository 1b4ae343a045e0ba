pub mod cache;
pub mod database;
pub mod models;

pub use cache::Cache;
pub use database::Database;
pub use models::{DocumentListing, QueryRun, StoredDocument};

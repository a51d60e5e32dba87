pub mod analytics;
pub mod api;
pub mod blockchain;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod state;
pub mod validation;

#[cfg(test)]
pub mod tests;

// Re-export specific items for convenience
pub use db::connection;
pub use db::transaction;
pub use db::address;
pub use models::{NormalizedTx, Transaction, TxType};
pub use api::error::ApiError;
pub use api::response::ApiResponse;
pub use api::route::create_router;
pub use blockchain::{AdapterRegistry, NetworkAdapter, SyncEngine};

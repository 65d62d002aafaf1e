pub mod app_config;
pub mod inventory_repo;
pub mod secret;

pub use app_config::Config;
pub use inventory_repo::{JsonInventoryStore, StoreError};
pub use secret::Secret;

pub mod enums;
pub mod memory;
pub mod models;
pub mod services;
pub mod store;

pub use store::{DataStore, StoreError};

pub mod models;
pub mod repository;
pub mod memory;
pub mod migrations;

pub use models::*;
pub use repository::*;
pub use memory::InMemoryTokenStore;
pub use migrations::MigrationRunner;

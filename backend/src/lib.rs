pub mod api;
pub mod config;
pub mod database;
pub mod ledger;
pub mod token_registry;

pub mod config;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod state;

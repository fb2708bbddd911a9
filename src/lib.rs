//! Points wagering ledger with an idempotent settlement engine over a
//! version-checked document store.

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod intake;
pub mod ledger;
pub mod middleware;
pub mod notify;
pub mod server;
pub mod settlement;
pub mod stats;
pub mod store;

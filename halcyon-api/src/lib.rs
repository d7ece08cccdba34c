pub mod auth;
pub mod auto_topup;
pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod openapi;
pub mod payments;
pub mod routes;
pub mod virtfusion;

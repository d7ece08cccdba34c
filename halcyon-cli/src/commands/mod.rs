pub mod admin;
pub mod auth;
pub mod billing;
pub mod deploy;
pub mod overview;
pub mod servers;
pub mod tickets;
pub mod wallet;

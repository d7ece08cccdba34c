pub mod actions;
pub mod money;
pub mod tickets;
pub mod validation;

pub use actions::{Endpoint, HttpMethod, ServerAction, ValidatedAction};
pub use validation::ValidationError;

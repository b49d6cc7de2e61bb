//! Common types for the label worker: secrets, config errors and the
//! shared account/validation error taxonomy.

mod account_error;
mod error;
mod secret;
pub mod validation;

pub use account_error::{AccountError, AccountErrorKind};
pub use error::{Error, Result};
pub use secret::Secret;
pub use validation::ValidationError;

//! Client-side form rules.

pub mod error;
pub mod validation;

pub use error::DomainError;
pub use validation::Validate;

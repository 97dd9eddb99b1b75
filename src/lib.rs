pub mod config;
pub mod form;
pub mod prelude;
pub mod signup;

#[cfg(test)]
mod test_public_api;

pub use crate::config::{ConfigError, SignupConfig, Strictness};
pub use crate::signup::{SignupValidator, SubmitResult};

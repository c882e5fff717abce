#![forbid(unsafe_code)]

pub mod artifacts;
pub(crate) mod auth;
mod cli;
pub(crate) mod client;
pub mod devices;
pub mod error;
mod logging;
pub mod token_path;

pub use cli::run;
pub use error::ConfigError;

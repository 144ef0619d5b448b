//! # te-core
//!
//! Shared foundation for the trigeff workspace: the error taxonomy, the
//! analysis configuration and the fit result type.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::FitResult;

/// trigeff version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

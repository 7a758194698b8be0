//! Typed startup errors and their process exit codes.
//!
//! `main` validates its command-line arguments before any networking starts
//! (see `cli.rs`). Each way that validation can fail carries a fixed exit
//! code — this enum makes that mapping total and checked by the compiler
//! instead of scattering `std::process::exit` calls through the
//! argument-handling code.

use thiserror::Error;

/// A startup-time validation failure, with the exit code the process must
/// return for it baked into `exit_code()`.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Too few arguments were given (no depot name).
    #[error("Usage: depot name {{goods qty}}...")]
    Usage,

    /// The depot name (or, transitively, a good name) contained a forbidden
    /// character or was empty.
    #[error("Invalid name(s)")]
    InvalidName,

    /// A starting quantity failed to parse as a non-negative integer.
    #[error("Invalid quantity")]
    InvalidQuantity,
}

impl StartupError {
    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Usage => 1,
            StartupError::InvalidName => 2,
            StartupError::InvalidQuantity => 3,
        }
    }
}

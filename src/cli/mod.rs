//! CLI command implementations

pub mod error;
pub mod harvest;
pub mod verify;

pub use error::CliError;
pub use harvest::{Cli, Commands, OutputFormat};
pub use verify::{ExportCommand, VerifyCommand};

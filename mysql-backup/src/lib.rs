//! MySQL Backup Runner Library
//!
//! Lock-protected dump, compress, checksum, rotate and publish of a MySQL
//! database, driven by external tools.

pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod preflight;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{BackupRunner, RunOutcome};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;

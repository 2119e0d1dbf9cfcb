// ABOUTME: Command implementations for the migrator CLI
// ABOUTME: Exports migrate, status and validate commands

pub mod migrate;
pub mod status;
pub mod validate;

pub use migrate::migrate;
pub use status::status;
pub use validate::validate;

//! `drydock-core` — shared building blocks: configuration, domain types,
//! errors, and the size-capped log-file writer.

pub mod config;
pub mod error;
pub mod logfile;
pub mod types;

pub use config::DrydockConfig;
pub use error::{CoreError, Result};

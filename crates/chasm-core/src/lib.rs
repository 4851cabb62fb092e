//! chasm-core: shared types, configuration, and error types

pub mod config;
pub mod error;
pub mod types;

pub use error::{ChasmError, ChasmResult};
pub use types::{FileShare, Share, ShareId, StoreConfig, METADATA_FILE, IGNORE_FILE};

//! # snapfeed Common Library
//!
//! Shared code for the snapfeed producers including:
//! - Error type used by configuration and I/O paths
//! - TOML bootstrap configuration loading
//! - Loosely-typed record container with typed accessors
//! - Timestamp helpers (capture time, epoch conversion, date partitions)

pub mod config;
pub mod error;
pub mod record;
pub mod time;

pub use error::{Error, Result};
pub use record::RawRecord;

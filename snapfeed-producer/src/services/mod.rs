//! Service modules for the producer pipeline
//!
//! - `source_client`: upstream polling
//! - `enricher`: processor-added fields

pub mod enricher;
pub mod source_client;

pub use enricher::RecordEnricher;
pub use source_client::{RecordSource, SourceClient};

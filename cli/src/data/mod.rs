pub mod dataset;
pub mod snapshot;
pub mod source;

pub use source::{HealthSource, LocalSource, RemoteSource, SourceError};

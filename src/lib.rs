// Taxon Audit - Core Library
// Reconciles the local plant catalog against external taxonomic sources

pub mod catalog;
pub mod config;
pub mod exceptions;
pub mod normalize;
pub mod report;
pub mod rows;
pub mod sources;
pub mod store;

// Re-export commonly used types
pub use catalog::{Catalog, Taxon};
pub use config::Config;
pub use exceptions::Exceptions;
pub use normalize::{is_genus_only, is_placeholder, Normalizer};
pub use report::{ErrorLog, LogEntry};
pub use rows::{read_csv, read_tsv, Row};
pub use sources::inat::{InatApi, NameSearch, NameSearchResult};
pub use sources::Source;
pub use store::{DuplicatePolicy, ExternalRecord, InsertOutcome, RecordStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod directory;
pub mod extraction;

pub use directory::{
    AttributeValue, BindPassword, ConnectionSettings, DirectoryEntry, ExtractorConfig,
    OutputFormat, OutputRecord, Protocol, Provenance, SearchRequest, DEFAULT_FILTER,
    DEFAULT_PAGE_SIZE, DEFAULT_TIMEOUT_SECS,
};
pub use extraction::{ExtractionError, ExtractionResult, RunSummary};

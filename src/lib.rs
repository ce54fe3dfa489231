// Consignado Report Mapper - Core Library
// Exposes all modules for use in the CLI, API server, and tests

pub mod banks;
pub mod batch;
pub mod ingest;
pub mod normalize;
pub mod output;
pub mod reference;
pub mod resolver;

// Re-export commonly used types
pub use banks::{
    adapter_for, detect_bank, BankAdapter, BankKind, RecordFields, RecordParseError,
};
pub use batch::{
    BatchOutcome, BatchProcessor, JobStatus, JobStore, ProcessingJob, ReportSummary,
    ResolvedRecord, UploadedFile,
};
pub use ingest::Dataset;
pub use normalize::{canonical_modality, normalize, normalize_status};
pub use reference::{
    composite_key, group_key, MappingIndex, ReferenceEntry, ReferenceLoadError,
};
pub use resolver::{resolve, MatchKind, ResolutionQuery, ResolutionResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Event-driven ingestion: notification, fetch, preprocess, score, persist.

pub mod failure;
pub mod fetcher;
pub mod notification;
pub mod pipeline;
pub mod preprocess;

pub use failure::{BatchFailurePolicy, LogAndDrop};
pub use fetcher::{FetchError, ObjectFetcher};
pub use notification::{
    decode_notification, unwrap_push_envelope, NotApplicable, ObjectChangeEvent,
    STORAGE_OBJECT_KIND,
};
pub use pipeline::{IngestOutcome, IngestSummary, IngestionPipeline, PipelineError};
pub use preprocess::{FeatureBatch, PreprocessError, Preprocessor, RawTable, SCALED_AMOUNT_COLUMN};

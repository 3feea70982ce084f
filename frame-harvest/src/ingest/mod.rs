//! Live broadcast ingestion: manifest inspection, segment download, first
//! frame decode and persistence.

pub mod decoder;
pub mod fetcher;
pub mod ingester;
pub mod manifest;

pub use decoder::{FfmpegFrameDecoder, FrameDecoder, prepare_frame};
pub use fetcher::{FetchError, HttpMediaFetcher, MediaFetcher, RetryPolicy};
pub use ingester::{BroadcastSample, IngestError, IngestReport, IngestState, SegmentIngester};

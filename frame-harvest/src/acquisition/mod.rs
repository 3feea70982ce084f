//! Acquisition: the coordinator loop, the dataset monitor and the stop
//! listener. All three share one cancellation token.

pub mod monitor;
pub mod service;
pub mod signal;

pub use monitor::{DatasetMonitor, DatasetReport};
pub use service::{AcquisitionLoop, AcquisitionSummary, IterationOutcome, LoopSettings};
pub use signal::spawn_stop_listener;

//! Upload executor
//!
//! - [`plan`] - Maps a file or directory onto object keys
//! - [`transfer`] - Runs the planned uploads in the background
//! - [`progress`] - Progress bar fed from the transfer counters
//! - [`executor`] - Ties the three together and waits for the result

pub mod executor;
pub mod plan;
pub mod progress;
pub mod transfer;

pub use executor::UploadExecutor;
pub use transfer::{TransferOutcome, TransferState};

//! Transfer jobs run through azcopy.
//!
//! [`status`] parses the engine's JSON lines, [`outcome`] classifies the
//! terminal record, [`progress`] turns records into UI increments, and
//! [`job`] runs the engine as a subprocess.  [`command`] builds the azcopy
//! argument list and [`registry`] tracks running jobs.

pub mod command;
pub mod job;
pub mod outcome;
pub mod progress;
pub mod registry;
pub mod status;

pub use command::{CopyCommand, FromTo, Overwrite, TransferLocation};
pub use job::{consume_lines, spawn_copy, spawn_engine, JobHandle, JobOptions, TransferEvent};
pub use outcome::{classify, Classification, TransferOutcome};
pub use status::{parse_line, EngineLine, JobStatus, TransferStatus};

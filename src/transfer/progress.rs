//! Per-job progress tracking.
//!
//! Host progress bars take increments rather than absolute values, so the
//! tracker remembers the last percentage and hands out deltas.  It also
//! checks the stream as a whole (ordering, monotonic percent) on top of the
//! per-record checks in [`TransferStatus::validate`].

use std::fmt;

use tracing::warn;

use super::status::{StatusWarning, TransferStatus};

/// A stream-level or record-level inconsistency.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressWarning {
    Record(StatusWarning),
    /// `PercentComplete` went down between consecutive records.
    PercentDecreased { previous: f64, current: f64 },
    /// A record arrived after the terminal one.
    AfterTerminal,
}

impl fmt::Display for ProgressWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressWarning::Record(w) => fmt::Display::fmt(w, f),
            ProgressWarning::PercentDecreased { previous, current } => write!(
                f,
                "percent complete went from {} down to {}",
                previous, current
            ),
            ProgressWarning::AfterTerminal => f.write_str("status record after end of job"),
        }
    }
}

/// What the UI should do with one record.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Percentage points to add to the progress bar; never negative.
    pub increment: f64,
    pub message: String,
    pub warnings: Vec<ProgressWarning>,
}

/// Progress state of a single job.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last_percent: f64,
    records: u64,
    finished: bool,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Percentage reported by the latest record.
    pub fn percent(&self) -> f64 {
        self.last_percent
    }

    pub fn records_seen(&self) -> u64 {
        self.records
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fold one record into the tracker.
    pub fn observe(&mut self, status: &TransferStatus) -> ProgressUpdate {
        let record = status.record();
        let mut warnings: Vec<ProgressWarning> = status
            .validate()
            .into_iter()
            .map(ProgressWarning::Record)
            .collect();

        if self.finished {
            warnings.push(ProgressWarning::AfterTerminal);
        }

        let current = record.percent_complete.clamp(0.0, 100.0);
        let increment = if current < self.last_percent {
            warnings.push(ProgressWarning::PercentDecreased {
                previous: self.last_percent,
                current,
            });
            0.0
        } else {
            current - self.last_percent
        };
        self.last_percent = self.last_percent.max(current);
        self.records += 1;
        if status.is_terminal() {
            self.finished = true;
        }

        for w in &warnings {
            warn!(warning = %w, "Inconsistent transfer status");
        }

        ProgressUpdate {
            increment,
            message: progress_message(status),
            warnings,
        }
    }
}

/// Short progress line, e.g. `"3/10 transfers (30%)"`.
pub fn progress_message(status: &TransferStatus) -> String {
    let record = status.record();
    let mut message = format!(
        "{}/{} transfers ({:.0}%)",
        record.transfers_completed, record.total_transfers, record.percent_complete
    );
    if record.transfers_failed > 0 {
        message.push_str(&format!(", {} failed", record.transfers_failed));
    }
    if record.transfers_skipped > 0 {
        message.push_str(&format!(", {} skipped", record.transfers_skipped));
    }
    if record.is_disk_constrained {
        message.push_str(", limited by disk speed");
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::status::tests::{end_of_job, progress};
    use crate::transfer::status::{parse_line, EngineLine};

    fn status(line: &str) -> TransferStatus {
        match parse_line(line).unwrap() {
            EngineLine::Status(s) => s,
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[test]
    fn test_increments_sum_to_percent() {
        let mut tracker = ProgressTracker::new();
        let a = tracker.observe(&status(&progress(10.0, 1)));
        let b = tracker.observe(&status(&progress(35.0, 3)));
        assert_eq!(a.increment, 10.0);
        assert_eq!(b.increment, 25.0);
        assert_eq!(tracker.percent(), 35.0);
        assert!(a.warnings.is_empty() && b.warnings.is_empty());
        assert_eq!(b.message, "3/10 transfers (35%)");
    }

    #[test]
    fn test_decrease_warns_and_never_goes_negative() {
        let mut tracker = ProgressTracker::new();
        tracker.observe(&status(&progress(50.0, 5)));
        let update = tracker.observe(&status(&progress(40.0, 4)));
        assert_eq!(update.increment, 0.0);
        assert_eq!(
            update.warnings,
            vec![ProgressWarning::PercentDecreased {
                previous: 50.0,
                current: 40.0
            }]
        );
        assert_eq!(tracker.percent(), 50.0);
    }

    #[test]
    fn test_terminal_then_extra_record() {
        let mut tracker = ProgressTracker::new();
        tracker.observe(&status(&end_of_job("Completed", "")));
        assert!(tracker.is_finished());
        let update = tracker.observe(&status(&end_of_job("Completed", "")));
        assert!(update.warnings.contains(&ProgressWarning::AfterTerminal));
        assert_eq!(tracker.records_seen(), 2);
    }

    #[test]
    fn test_message_mentions_failures_and_disk() {
        let line = r#"{"StatusType":"Progress","JobStatus":"InProgress","TotalTransfers":5,"TransfersCompleted":2,"TransfersFailed":1,"TransfersSkipped":1,"PercentComplete":80,"IsDiskConstrained":true}"#;
        assert_eq!(
            progress_message(&status(line)),
            "2/5 transfers (80%), 1 failed, 1 skipped, limited by disk speed"
        );
    }
}

//! Terminal outcome classification.
//!
//! Turns the final `EndOfJob` record into one of a handful of outcomes the
//! front end can map to a notification, plus the failed/skipped lists for
//! an optional detail view.

use std::fmt;

use tracing::warn;

use super::status::{JobStatus, TransferDetail, TransferStatus};

/// What the user is told about a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Succeeded,
    CompletedWithErrors,
    CompletedWithSkipped,
    CompletedWithErrorsAndSkipped,
    Cancelled,
    /// `message` is the engine's `ErrorMsg` or a local diagnostic; `None`
    /// means the cause is unknown.
    Failed { message: Option<String> },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Succeeded)
    }

    /// Metric label / short name.
    pub fn label(&self) -> &'static str {
        match self {
            TransferOutcome::Succeeded => "succeeded",
            TransferOutcome::CompletedWithErrors => "completed_with_errors",
            TransferOutcome::CompletedWithSkipped => "completed_with_skipped",
            TransferOutcome::CompletedWithErrorsAndSkipped => "completed_with_errors_and_skipped",
            TransferOutcome::Cancelled => "cancelled",
            TransferOutcome::Failed { .. } => "failed",
        }
    }

    /// The job status an engine would report for this outcome.
    fn expected_job_status(&self) -> JobStatus {
        match self {
            TransferOutcome::Succeeded => JobStatus::Completed,
            TransferOutcome::CompletedWithErrors => JobStatus::CompletedWithErrors,
            TransferOutcome::CompletedWithSkipped => JobStatus::CompletedWithSkipped,
            TransferOutcome::CompletedWithErrorsAndSkipped => {
                JobStatus::CompletedWithErrorsAndSkipped
            }
            TransferOutcome::Cancelled => JobStatus::Cancelled,
            TransferOutcome::Failed { .. } => JobStatus::Failed,
        }
    }

    /// Notification text for a job described as `what` (e.g. `"Upload of 'photos'"`).
    pub fn user_message(&self, what: &str, failed: usize, skipped: usize) -> String {
        match self {
            TransferOutcome::Succeeded => format!("{} completed.", what),
            TransferOutcome::CompletedWithErrors => {
                format!("{} completed with {} failed transfer(s).", what, failed)
            }
            TransferOutcome::CompletedWithSkipped => {
                format!("{} completed with {} skipped transfer(s).", what, skipped)
            }
            TransferOutcome::CompletedWithErrorsAndSkipped => format!(
                "{} completed with {} failed and {} skipped transfer(s).",
                what, failed, skipped
            ),
            TransferOutcome::Cancelled => format!("{} was cancelled.", what),
            TransferOutcome::Failed { message: Some(m) } => format!("{} failed: {}", what, m),
            TransferOutcome::Failed { message: None } => {
                format!("{} failed with an unknown error.", what)
            }
        }
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The derived outcome disagrees with the reported `JobStatus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeMismatch {
    pub reported: JobStatus,
    pub derived: JobStatus,
}

/// Result of classifying a terminal record.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub outcome: TransferOutcome,
    pub failed: Vec<TransferDetail>,
    pub skipped: Vec<TransferDetail>,
    pub mismatch: Option<OutcomeMismatch>,
}

impl Classification {
    /// Outcome for a job whose engine went away without a terminal record.
    pub fn unknown_failure(detail: Option<String>) -> Self {
        Self {
            outcome: TransferOutcome::Failed { message: detail },
            failed: Vec::new(),
            skipped: Vec::new(),
            mismatch: None,
        }
    }

    pub fn user_message(&self, what: &str) -> String {
        self.outcome
            .user_message(what, self.failed.len(), self.skipped.len())
    }
}

/// Classify a record.  `Progress` records have no outcome yet.
pub fn classify(status: &TransferStatus) -> Option<Classification> {
    match status {
        TransferStatus::Progress(_) => None,
        TransferStatus::EndOfJob(_) => Some(classify_terminal(status)),
    }
}

fn classify_terminal(status: &TransferStatus) -> Classification {
    let record = status.record();
    let failed = record.failed_transfers.clone();
    let skipped = record.skipped_transfers.clone();

    let outcome = if record.job_status == JobStatus::Cancelled {
        TransferOutcome::Cancelled
    } else if record.job_status == JobStatus::Failed || record.error_msg.is_some() {
        TransferOutcome::Failed {
            message: record.error_msg.clone(),
        }
    } else {
        match (failed.is_empty(), skipped.is_empty()) {
            (true, true) => TransferOutcome::Succeeded,
            (false, true) => TransferOutcome::CompletedWithErrors,
            (true, false) => TransferOutcome::CompletedWithSkipped,
            (false, false) => TransferOutcome::CompletedWithErrorsAndSkipped,
        }
    };

    // An ErrorMsg overrides whatever the status string says, so only
    // cross-check outcomes derived from the lists.
    let derived = outcome.expected_job_status();
    let mismatch = if derived != record.job_status && record.error_msg.is_none() {
        warn!(
            reported = %record.job_status,
            derived = %derived,
            failed = failed.len(),
            skipped = skipped.len(),
            "Transfer status disagrees with reported failed/skipped lists"
        );
        Some(OutcomeMismatch {
            reported: record.job_status,
            derived,
        })
    } else {
        None
    };

    Classification {
        outcome,
        failed,
        skipped,
        mismatch,
    }
}

//! Transfer status records emitted by azcopy.
//!
//! azcopy started with `--output-type=json` prints one JSON object per line.
//! Two shapes are accepted:
//!
//! * a bare status object tagged by `StatusType` (`Progress` or `EndOfJob`);
//! * azcopy's envelope, `{"TimeStamp", "MessageType", "MessageContent"}`,
//!   where `MessageContent` is itself a JSON-encoded status body for
//!   `Progress` / `EndOfJob` messages and free text otherwise.
//!
//! Records are never rejected for being inconsistent; [`TransferStatus::validate`]
//! reports problems as warnings so the consumer can keep going.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::{ExplorerError, Result};

/// Job state as reported in `JobStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    InProgress,
    Cancelling,
    Cancelled,
    Completed,
    CompletedWithSkipped,
    CompletedWithErrors,
    CompletedWithErrorsAndSkipped,
    Failed,
}

impl JobStatus {
    /// True for the states that only appear on `EndOfJob` records.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::InProgress | JobStatus::Cancelling)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::InProgress => "InProgress",
            JobStatus::Cancelling => "Cancelling",
            JobStatus::Cancelled => "Cancelled",
            JobStatus::Completed => "Completed",
            JobStatus::CompletedWithSkipped => "CompletedWithSkipped",
            JobStatus::CompletedWithErrors => "CompletedWithErrors",
            JobStatus::CompletedWithErrorsAndSkipped => "CompletedWithErrorsAndSkipped",
            JobStatus::Failed => "Failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed or skipped transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransferDetail {
    #[serde(default)]
    pub src: String,
    #[serde(default)]
    pub dst: String,
    /// Reason reported by the engine, e.g. `Failed` or `SkippedEntityAlreadyExists`.
    #[serde(default)]
    pub transfer_status: String,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub error_code: i32,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub is_folder_properties: bool,
}

/// Fields shared by every status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusRecord {
    pub job_status: JobStatus,
    #[serde(rename = "JobID", default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub active_connections: u64,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub complete_job_ordered: bool,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub total_transfers: u64,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub file_transfers: u64,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub folder_property_transfers: u64,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub transfers_completed: u64,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub transfers_failed: u64,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub transfers_skipped: u64,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub percent_complete: f64,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub bytes_over_wire: u64,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub total_bytes_transferred: u64,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub total_bytes_enumerated: u64,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub total_bytes_expected: u64,
    /// `null`, absent and `[]` all mean "none".
    #[serde(default, deserialize_with = "null_as_empty")]
    pub failed_transfers: Vec<TransferDetail>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub skipped_transfers: Vec<TransferDetail>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub is_disk_constrained: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "blank_as_none", skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

/// azcopy tags its counters with Go's `json:",string"`, so they arrive
/// quoted (`"TotalTransfers":"4"`).  Accept both forms; `null` and `""`
/// mean the default.
fn lenient_scalar<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + std::str::FromStr + Default,
    T::Err: fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar<T> {
        Value(T),
        Text(String),
    }

    match Option::<Scalar<T>>::deserialize(deserializer)? {
        None => Ok(T::default()),
        Some(Scalar::Value(v)) => Ok(v),
        Some(Scalar::Text(s)) if s.trim().is_empty() => Ok(T::default()),
        Some(Scalar::Text(s)) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<TransferDetail>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<TransferDetail>>::deserialize(deserializer)?.unwrap_or_default())
}

fn blank_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.trim().is_empty()))
}

/// A status record, tagged by whether the job is still running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "StatusType")]
pub enum TransferStatus {
    Progress(StatusRecord),
    EndOfJob(StatusRecord),
}

/// Problems found in a single record.  Never fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusWarning {
    /// `StatusType` and `JobStatus` disagree.
    TagMismatch { tag: &'static str, job_status: JobStatus },
    /// completed + failed + skipped exceeds the total.
    CountsExceedTotal { accounted: u64, total: u64 },
    /// `PercentComplete` outside 0..=100.
    PercentOutOfRange(f64),
}

impl fmt::Display for StatusWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusWarning::TagMismatch { tag, job_status } => {
                write!(f, "{} record carries job status {}", tag, job_status)
            }
            StatusWarning::CountsExceedTotal { accounted, total } => write!(
                f,
                "{} transfers accounted for but only {} in total",
                accounted, total
            ),
            StatusWarning::PercentOutOfRange(p) => write!(f, "percent complete {} out of range", p),
        }
    }
}

impl TransferStatus {
    pub fn record(&self) -> &StatusRecord {
        match self {
            TransferStatus::Progress(r) | TransferStatus::EndOfJob(r) => r,
        }
    }

    pub fn into_record(self) -> StatusRecord {
        match self {
            TransferStatus::Progress(r) | TransferStatus::EndOfJob(r) => r,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::EndOfJob(_))
    }

    pub fn tag(&self) -> &'static str {
        match self {
            TransferStatus::Progress(_) => "Progress",
            TransferStatus::EndOfJob(_) => "EndOfJob",
        }
    }

    /// Check the record's internal consistency.
    pub fn validate(&self) -> Vec<StatusWarning> {
        let record = self.record();
        let mut warnings = Vec::new();

        if record.job_status.is_terminal() != self.is_terminal() {
            warnings.push(StatusWarning::TagMismatch {
                tag: self.tag(),
                job_status: record.job_status,
            });
        }

        let accounted = record
            .transfers_completed
            .saturating_add(record.transfers_failed)
            .saturating_add(record.transfers_skipped);
        if accounted > record.total_transfers {
            warnings.push(StatusWarning::CountsExceedTotal {
                accounted,
                total: record.total_transfers,
            });
        }

        if !(0.0..=100.0).contains(&record.percent_complete) {
            warnings.push(StatusWarning::PercentOutOfRange(record.percent_complete));
        }

        warnings
    }
}

/// Kind of a non-status message from the engine's envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Init,
    Info,
    Progress,
    EndOfJob,
    Error,
    Prompt,
    Dryrun,
    ListObject,
    ListSummary,
    LoginStatusInfo,
    GetProperties,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope {
    message_type: MessageType,
    #[serde(default)]
    message_content: String,
    #[serde(default)]
    time_stamp: Option<DateTime<Utc>>,
}

/// One classified line of engine output.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineLine {
    Status(TransferStatus),
    Message { kind: MessageType, content: String },
    Blank,
}

/// Parse one line of engine stdout.
pub fn parse_line(line: &str) -> Result<EngineLine> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(EngineLine::Blank);
    }
    if !line.starts_with('{') {
        return Err(ExplorerError::malformed("not a JSON object"));
    }

    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.get("StatusType").is_some() {
        return Ok(EngineLine::Status(serde_json::from_value(value)?));
    }
    if value.get("MessageType").is_none() {
        return Err(ExplorerError::malformed(
            "neither StatusType nor MessageType present",
        ));
    }

    let envelope: Envelope = serde_json::from_value(value)?;
    match envelope.message_type {
        MessageType::Progress | MessageType::EndOfJob => {
            let mut record: StatusRecord = serde_json::from_str(&envelope.message_content)?;
            if record.time_stamp.is_none() {
                record.time_stamp = envelope.time_stamp;
            }
            Ok(EngineLine::Status(match envelope.message_type {
                MessageType::EndOfJob => TransferStatus::EndOfJob(record),
                _ => TransferStatus::Progress(record),
            }))
        }
        kind => Ok(EngineLine::Message {
            kind,
            content: envelope.message_content,
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn end_of_job(job_status: &str, extra: &str) -> String {
        format!(
            r#"{{"StatusType":"EndOfJob","JobStatus":"{}","TotalTransfers":4,"TransfersCompleted":2,"TransfersFailed":1,"TransfersSkipped":1,"PercentComplete":100,"TimeStamp":"2021-03-04T22:03:07.123456Z"{}}}"#,
            job_status, extra
        )
    }

    pub(crate) fn progress(percent: f64, completed: u64) -> String {
        format!(
            r#"{{"StatusType":"Progress","JobStatus":"InProgress","ActiveConnections":8,"TotalTransfers":10,"TransfersCompleted":{},"PercentComplete":{}}}"#,
            completed, percent
        )
    }

    #[test]
    fn test_parse_bare_progress() {
        let line = progress(42.5, 4);
        let EngineLine::Status(status) = parse_line(&line).unwrap() else {
            panic!("expected status");
        };
        assert!(!status.is_terminal());
        let record = status.record();
        assert_eq!(record.job_status, JobStatus::InProgress);
        assert_eq!(record.active_connections, 8);
        assert_eq!(record.transfers_completed, 4);
        assert_eq!(record.percent_complete, 42.5);
        assert!(record.failed_transfers.is_empty());
        assert!(status.validate().is_empty());
    }

    #[test]
    fn test_parse_bare_end_of_job_with_lists() {
        let line = end_of_job(
            "CompletedWithErrorsAndSkipped",
            r#","FailedTransfers":[{"Src":"/tmp/a","Dst":"https://x/a","TransferStatus":"Failed","ErrorCode":403}],"SkippedTransfers":[{"Src":"/tmp/b","Dst":"https://x/b","TransferStatus":"SkippedEntityAlreadyExists"}]"#,
        );
        let EngineLine::Status(status) = parse_line(&line).unwrap() else {
            panic!("expected status");
        };
        assert!(status.is_terminal());
        let record = status.record();
        assert_eq!(record.failed_transfers.len(), 1);
        assert_eq!(record.failed_transfers[0].error_code, 403);
        assert_eq!(record.skipped_transfers[0].src, "/tmp/b");
        let ts = record.time_stamp.unwrap();
        assert_eq!(ts.timestamp_subsec_micros(), 123456);
    }

    #[test]
    fn test_null_lists_and_blank_error() {
        let line = end_of_job("Completed", r#","FailedTransfers":null,"SkippedTransfers":null,"ErrorMsg":"""#);
        let EngineLine::Status(status) = parse_line(&line).unwrap() else {
            panic!("expected status");
        };
        assert!(status.record().failed_transfers.is_empty());
        assert!(status.record().error_msg.is_none());
    }

    #[test]
    fn test_parse_envelope() {
        let content = r#"{"JobID":"6d1f2b9c-6a52-4d7e-9a53-0a3c0c4f0a11","JobStatus":"Completed","TotalTransfers":1,"TransfersCompleted":1,"PercentComplete":100}"#;
        let line = serde_json::json!({
            "TimeStamp": "2021-03-04T22:03:07.654321Z",
            "MessageType": "EndOfJob",
            "MessageContent": content,
        })
        .to_string();
        let EngineLine::Status(status) = parse_line(&line).unwrap() else {
            panic!("expected status");
        };
        assert!(status.is_terminal());
        let record = status.record();
        assert!(record.job_id.is_some());
        assert_eq!(record.time_stamp.unwrap().timestamp_subsec_micros(), 654321);
    }

    #[test]
    fn test_parse_envelope_with_quoted_counters() {
        let content = r#"{"ErrorMsg":"","ActiveConnections":"0","CompleteJobOrdered":true,"JobStatus":"CompletedWithSkipped","TotalTransfers":"3","FileTransfers":"3","FolderPropertyTransfers":"0","TransfersCompleted":"2","TransfersFailed":"0","TransfersSkipped":"1","BytesOverWire":"5","TotalBytesTransferred":"5","TotalBytesEnumerated":"7","TotalBytesExpected":"0","PercentComplete":"100","AverageIOPS":0,"FailedTransfers":[],"SkippedTransfers":[{"Src":"/tmp/b","Dst":"https://x/b","TransferStatus":"SkippedEntityAlreadyExists","ErrorCode":"0","IsFolderProperties":false}],"IsDiskConstrained":false,"PerformanceAdvice":null}"#;
        let line = serde_json::json!({
            "TimeStamp": "2021-03-04T22:03:07Z",
            "MessageType": "EndOfJob",
            "MessageContent": content,
        })
        .to_string();
        let EngineLine::Status(status) = parse_line(&line).unwrap() else {
            panic!("expected status");
        };
        assert!(status.validate().is_empty());
        let record = status.record();
        assert_eq!(record.job_status, JobStatus::CompletedWithSkipped);
        assert!(record.complete_job_ordered);
        assert_eq!(record.total_transfers, 3);
        assert_eq!(record.transfers_completed, 2);
        assert_eq!(record.transfers_skipped, 1);
        assert_eq!(record.bytes_over_wire, 5);
        assert_eq!(record.total_bytes_enumerated, 7);
        assert_eq!(record.percent_complete, 100.0);
        assert_eq!(record.skipped_transfers[0].error_code, 0);
        assert!(record.error_msg.is_none());
    }

    #[test]
    fn test_quoted_counter_must_be_numeric() {
        let line = r#"{"StatusType":"Progress","JobStatus":"InProgress","TotalTransfers":"many"}"#;
        assert!(parse_line(line).is_err());
    }

    #[test]
    fn test_parse_envelope_info() {
        let line = r#"{"TimeStamp":"2021-03-04T22:03:07Z","MessageType":"Info","MessageContent":"Scanning..."}"#;
        assert_eq!(
            parse_line(line).unwrap(),
            EngineLine::Message {
                kind: MessageType::Info,
                content: "Scanning...".into()
            }
        );
    }

    #[test]
    fn test_parse_envelope_unknown_kind() {
        let line = r#"{"MessageType":"SomethingNew","MessageContent":"x"}"#;
        let EngineLine::Message { kind, .. } = parse_line(line).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(kind, MessageType::Other);
    }

    #[test]
    fn test_blank_and_malformed() {
        assert_eq!(parse_line("   ").unwrap(), EngineLine::Blank);
        assert!(parse_line("INFO: plain text").is_err());
        assert!(parse_line("{truncated").is_err());
        assert!(parse_line(r#"{"hello":1}"#).is_err());
        assert!(parse_line(r#"{"StatusType":"Progress","JobStatus":"Sleeping"}"#).is_err());
    }

    #[test]
    fn test_validate_tag_mismatch() {
        let line = r#"{"StatusType":"Progress","JobStatus":"Completed","TotalTransfers":1,"TransfersCompleted":1}"#;
        let EngineLine::Status(status) = parse_line(line).unwrap() else {
            panic!("expected status");
        };
        assert_eq!(
            status.validate(),
            vec![StatusWarning::TagMismatch {
                tag: "Progress",
                job_status: JobStatus::Completed
            }]
        );
    }

    #[test]
    fn test_validate_counts_and_percent() {
        let line = r#"{"StatusType":"Progress","JobStatus":"InProgress","TotalTransfers":2,"TransfersCompleted":2,"TransfersFailed":1,"PercentComplete":120}"#;
        let EngineLine::Status(status) = parse_line(line).unwrap() else {
            panic!("expected status");
        };
        let warnings = status.validate();
        assert!(warnings.contains(&StatusWarning::CountsExceedTotal {
            accounted: 3,
            total: 2
        }));
        assert!(warnings.contains(&StatusWarning::PercentOutOfRange(120.0)));
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(!JobStatus::Cancelling.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert_eq!(JobStatus::CompletedWithSkipped.to_string(), "CompletedWithSkipped");
    }
}

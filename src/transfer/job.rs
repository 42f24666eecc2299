//! Transfer job runner.
//!
//! Spawns the engine, reads its stdout line by line on a tokio task and
//! forwards parsed records over an `mpsc` channel.  The task always ends by
//! sending exactly one [`TransferEvent::Finished`], also when the engine
//! dies without printing a terminal record.
//!
//! Cancelling writes `cancel` to the engine's stdin (azcopy's
//! `--cancel-from-stdin`) and keeps reading so the engine's own `Cancelled`
//! record is still observed.  An engine that ignores the request is killed
//! after a grace period.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::command::CopyCommand;
use super::outcome::{classify, Classification};
use super::progress::{ProgressTracker, ProgressUpdate};
use super::status::{parse_line, EngineLine, MessageType, TransferStatus};
use crate::config::TransferConfig;
use crate::errors::{ExplorerError, Result};
use crate::metrics;

/// Something the UI may want to react to.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Status {
        status: TransferStatus,
        update: ProgressUpdate,
    },
    Message {
        kind: MessageType,
        content: String,
    },
    Finished(Classification),
}

/// Folds engine output lines into events and, at the end, an outcome.
#[derive(Debug, Default)]
pub struct StatusConsumer {
    tracker: ProgressTracker,
    terminal: Option<Classification>,
    bytes_transferred: u64,
    malformed: u64,
}

impl StatusConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines that could not be parsed so far.
    pub fn malformed_lines(&self) -> u64 {
        self.malformed
    }

    pub fn has_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    /// Handle one stdout line.  Returns the event to forward, if any.
    pub fn handle_line(&mut self, line: &str) -> Option<TransferEvent> {
        match parse_line(line) {
            Ok(EngineLine::Status(status)) => {
                metrics::record_line("status");
                let update = self.tracker.observe(&status);
                metrics::record_warnings(update.warnings.len());
                self.bytes_transferred = status.record().total_bytes_transferred;

                if let Some(classification) = classify(&status) {
                    if self.terminal.is_none() {
                        info!(
                            outcome = %classification.outcome,
                            failed = classification.failed.len(),
                            skipped = classification.skipped.len(),
                            "Transfer job reached a terminal state"
                        );
                        self.terminal = Some(classification);
                    } else {
                        warn!("Ignoring additional end-of-job record");
                    }
                }
                Some(TransferEvent::Status { status, update })
            }
            Ok(EngineLine::Message { kind, content }) => {
                metrics::record_line("message");
                match kind {
                    MessageType::Error => warn!(content = %content, "Transfer engine error"),
                    _ => debug!(kind = ?kind, content = %content, "Transfer engine message"),
                }
                Some(TransferEvent::Message { kind, content })
            }
            Ok(EngineLine::Blank) => None,
            Err(e) => {
                metrics::record_line("malformed");
                self.malformed += 1;
                warn!(error = %e, line = %line, "Skipping unparseable transfer engine output");
                None
            }
        }
    }

    /// Final outcome; `detail` explains a missing terminal record.
    pub fn finish(self, detail: Option<String>) -> Classification {
        let classification = match self.terminal {
            Some(c) => c,
            None => {
                warn!(
                    detail = detail.as_deref().unwrap_or("none"),
                    "Transfer engine stopped without a final status"
                );
                Classification::unknown_failure(detail)
            }
        };
        metrics::record_finished(classification.outcome.label(), self.bytes_transferred);
        classification
    }
}

/// Read a whole status stream (e.g. a recorded log) and forward its events.
///
/// Returns the classification that was also sent as `Finished`.
pub async fn consume_lines<R>(reader: R, tx: &mpsc::Sender<TransferEvent>) -> Result<Classification>
where
    R: AsyncBufRead + Unpin,
{
    let mut consumer = StatusConsumer::new();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(event) = consumer.handle_line(&line) {
            // A closed receiver only means nobody is watching any more.
            let _ = tx.send(event).await;
        }
    }
    let classification = consumer.finish(None);
    let _ = tx.send(TransferEvent::Finished(classification.clone())).await;
    Ok(classification)
}

/// Cloneable cancel switch for a running job.
#[derive(Debug, Clone)]
pub struct JobCanceller {
    notify: Arc<Notify>,
}

impl JobCanceller {
    fn new() -> Self {
        Self {
            notify: Arc::new(Notify::new()),
        }
    }

    /// Ask the engine to stop.  Status lines keep flowing until it exits.
    pub fn cancel(&self) {
        self.notify.notify_one();
    }
}

/// Tuning for a spawned job.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub cancel_grace: Duration,
    pub event_buffer: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            cancel_grace: Duration::from_secs(30),
            event_buffer: 64,
        }
    }
}

impl From<&TransferConfig> for JobOptions {
    fn from(config: &TransferConfig) -> Self {
        Self {
            cancel_grace: Duration::from_secs(config.cancel_grace_seconds),
            event_buffer: config.event_buffer.max(1),
        }
    }
}

/// A running engine process.
pub struct JobHandle {
    id: Uuid,
    description: String,
    events: mpsc::Receiver<TransferEvent>,
    canceller: JobCanceller,
    task: JoinHandle<()>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn canceller(&self) -> JobCanceller {
        self.canceller.clone()
    }

    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    /// Next event, or `None` once the runner is gone.
    pub async fn next_event(&mut self) -> Option<TransferEvent> {
        self.events.recv().await
    }

    /// Drive the job to the end, handing every event to `on_event`.
    pub async fn run_to_completion<F>(mut self, mut on_event: F) -> Classification
    where
        F: FnMut(&TransferEvent),
    {
        while let Some(event) = self.events.recv().await {
            on_event(&event);
            if let TransferEvent::Finished(classification) = event {
                return classification;
            }
        }
        // The runner task died before reporting.
        if let Err(e) = (&mut self.task).await {
            warn!(error = %e, job_id = %self.id, "Transfer job task failed");
        }
        Classification::unknown_failure(None)
    }
}

/// Spawn the engine and start consuming its output.
pub fn spawn_engine(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    description: impl Into<String>,
    options: JobOptions,
) -> Result<JobHandle> {
    let mut child = Command::new(program)
        .args(args)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExplorerError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let id = Uuid::new_v4();
    let description = description.into();
    info!(job_id = %id, program = %program, description = %description, "Transfer engine started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ExplorerError::Io(std::io::Error::other("engine stdout not captured")))?;
    let stderr = child.stderr.take();
    let stdin = child.stdin.take();

    let (tx, rx) = mpsc::channel(options.event_buffer.max(1));
    let canceller = JobCanceller::new();
    let notify = Arc::clone(&canceller.notify);
    let grace = options.cancel_grace;

    let task = tokio::spawn(async move {
        let stderr_task = tokio::spawn(drain_stderr(stderr));
        let mut consumer = StatusConsumer::new();
        let mut lines = BufReader::new(stdout).lines();
        let mut stdin = stdin;
        let mut kill_at: Option<Instant> = None;
        let mut killed = false;

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(event) = consumer.handle_line(&line) {
                            let _ = tx.send(event).await;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(job_id = %id, error = %e, "Failed to read transfer engine output");
                        break;
                    }
                },
                _ = notify.notified(), if kill_at.is_none() => {
                    info!(job_id = %id, "Cancelling transfer job");
                    request_cancel(&mut stdin).await;
                    kill_at = Some(Instant::now() + grace);
                }
                _ = tokio::time::sleep_until(kill_at.unwrap_or_else(Instant::now)), if kill_at.is_some() && !killed => {
                    warn!(job_id = %id, "Transfer engine ignored cancel request, killing it");
                    if let Err(e) = child.start_kill() {
                        warn!(job_id = %id, error = %e, "Failed to kill transfer engine");
                    }
                    killed = true;
                }
            }
        }
        drop(stdin);

        let exit = child.wait().await;
        let stderr_tail = stderr_task.await.ok().flatten();
        let detail = if consumer.has_terminal() {
            None
        } else {
            failure_detail(exit.as_ref().ok(), stderr_tail)
        };
        if let Ok(status) = &exit {
            debug!(job_id = %id, exit = %status, "Transfer engine exited");
        }

        let classification = consumer.finish(detail);
        let _ = tx.send(TransferEvent::Finished(classification)).await;
    });

    Ok(JobHandle {
        id,
        description,
        events: rx,
        canceller,
        task,
    })
}

/// Spawn azcopy for `command` using the configured binary and environment.
pub fn spawn_copy(command: &CopyCommand, config: &TransferConfig) -> Result<JobHandle> {
    let command = command.clone().log_level(config.log_level.clone());
    debug!(
        source = %command.source.redacted(),
        destination = %command.destination.redacted(),
        from_to = %command.from_to,
        "Launching azcopy"
    );
    spawn_engine(
        &config.azcopy_path,
        &command.args(),
        &config.engine_env(),
        command.describe(),
        JobOptions::from(config),
    )
}

async fn request_cancel(stdin: &mut Option<ChildStdin>) {
    let Some(pipe) = stdin.as_mut() else {
        return;
    };
    let result = async {
        pipe.write_all(b"cancel\n").await?;
        pipe.flush().await
    }
    .await;
    if let Err(e) = result {
        debug!(error = %e, "Could not deliver cancel request to transfer engine");
    }
}

/// Read stderr to the end so the engine never blocks on it; keep the last line.
async fn drain_stderr<R: AsyncRead + Unpin>(stderr: Option<R>) -> Option<String> {
    let stderr = stderr?;
    let mut lines = BufReader::new(stderr).lines();
    let mut last = None;
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if !line.is_empty() {
            debug!(line = %line, "Transfer engine stderr");
            last = Some(line.to_string());
        }
    }
    last
}

/// Diagnostic for a job without a terminal record.  `None` means unknown.
fn failure_detail(exit: Option<&ExitStatus>, stderr_tail: Option<String>) -> Option<String> {
    let code = exit.filter(|s| !s.success()).map(|s| match s.code() {
        Some(code) => format!("transfer engine exited with code {}", code),
        None => "transfer engine was terminated".to_string(),
    });
    match (code, stderr_tail) {
        (Some(code), Some(tail)) => Some(format!("{}: {}", code, tail)),
        (Some(code), None) => Some(code),
        (None, tail) => tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::outcome::TransferOutcome;
    use crate::transfer::status::tests::{end_of_job, progress};

    #[tokio::test]
    async fn test_consume_lines_skips_garbage() {
        let input = format!(
            "{}\nnot json at all\n\n{}\n{}\n",
            progress(10.0, 1),
            progress(60.0, 6),
            end_of_job("Completed", ""),
        );
        let (tx, mut rx) = mpsc::channel(16);
        let classification = consume_lines(input.as_bytes(), &tx).await.unwrap();
        drop(tx);
        assert_eq!(classification.outcome, TransferOutcome::Succeeded);

        let mut statuses = 0;
        let mut finished = 0;
        while let Some(event) = rx.recv().await {
            match event {
                TransferEvent::Status { .. } => statuses += 1,
                TransferEvent::Finished(_) => finished += 1,
                TransferEvent::Message { .. } => {}
            }
        }
        assert_eq!(statuses, 3);
        assert_eq!(finished, 1);
    }

    #[tokio::test]
    async fn test_consume_lines_without_terminal() {
        let input = format!("{}\n", progress(10.0, 1));
        let (tx, _rx) = mpsc::channel(16);
        let classification = consume_lines(input.as_bytes(), &tx).await.unwrap();
        assert_eq!(classification.outcome, TransferOutcome::Failed { message: None });
    }

    #[test]
    fn test_consumer_keeps_first_terminal() {
        let mut consumer = StatusConsumer::new();
        consumer.handle_line(&end_of_job("Cancelled", ""));
        consumer.handle_line(&end_of_job("Completed", ""));
        assert!(consumer.handle_line("garbage").is_none());
        assert_eq!(consumer.malformed_lines(), 1);
        assert_eq!(consumer.finish(None).outcome, TransferOutcome::Cancelled);
    }

    #[test]
    fn test_failure_detail() {
        assert_eq!(failure_detail(None, None), None);
        assert_eq!(
            failure_detail(None, Some("boom".into())),
            Some("boom".to_string())
        );
    }

    #[cfg(unix)]
    fn sh(script: &str) -> JobHandle {
        let args = vec!["-c".to_string(), script.to_string()];
        let options = JobOptions {
            cancel_grace: Duration::from_millis(200),
            event_buffer: 8,
        };
        spawn_engine("sh", &args, &[], "test job", options).unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawned_engine_reports_terminal_outcome() {
        let script = format!(
            "echo '{}'; echo 'noise'; echo '{}'",
            progress(50.0, 5),
            end_of_job("CompletedWithErrors", r#","FailedTransfers":[{"Src":"a","Dst":"b"}]"#),
        );
        let mut seen = Vec::new();
        let classification = sh(&script)
            .run_to_completion(|event| seen.push(event.clone()))
            .await;
        assert_eq!(classification.outcome, TransferOutcome::CompletedWithErrors);
        assert_eq!(classification.failed.len(), 1);
        assert!(matches!(seen.last(), Some(TransferEvent::Finished(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_exit_is_unknown_failure() {
        let classification = sh("exit 0").run_to_completion(|_| {}).await;
        assert_eq!(classification.outcome, TransferOutcome::Failed { message: None });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_reports_detail() {
        let classification = sh("echo 'disk on fire' >&2; exit 3")
            .run_to_completion(|_| {})
            .await;
        assert_eq!(
            classification.outcome,
            TransferOutcome::Failed {
                message: Some("transfer engine exited with code 3: disk on fire".into())
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_is_written_to_stdin() {
        // Stand-in engine: waits for a line on stdin, then reports cancellation.
        let script = format!(
            "echo '{}'; read cmd; [ \"$cmd\" = cancel ] && echo '{}'",
            progress(5.0, 0),
            end_of_job("Cancelled", ""),
        );
        let mut job = sh(&script);
        let first = job.next_event().await;
        assert!(matches!(first, Some(TransferEvent::Status { .. })));
        job.cancel();
        let classification = job.run_to_completion(|_| {}).await;
        assert_eq!(classification.outcome, TransferOutcome::Cancelled);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_engine_ignoring_cancel_is_killed() {
        let job = sh("exec sleep 30");
        job.cancel();
        let classification = tokio::time::timeout(
            Duration::from_secs(10),
            job.run_to_completion(|_| {}),
        )
        .await
        .expect("job should be killed after the grace period");
        assert!(matches!(classification.outcome, TransferOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let err = match spawn_engine(
            "/nonexistent/azcopy",
            &[],
            &[],
            "x",
            JobOptions::default(),
        ) {
            Err(e) => e,
            Ok(_) => panic!("expected spawn failure"),
        };
        assert_eq!(err.code(), "SpawnFailed");
    }
}

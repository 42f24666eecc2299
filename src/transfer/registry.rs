//! Registry of running transfer jobs.
//!
//! Lets the front end list what is running and cancel jobs individually or
//! all at once on shutdown.  Jobs never share state through the registry;
//! it only holds descriptions and cancel switches.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use super::job::{JobCanceller, JobHandle};

/// What the registry knows about a running job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: Uuid,
    pub description: String,
    pub started_at: DateTime<Utc>,
}

struct Entry {
    info: JobInfo,
    canceller: JobCanceller,
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<Uuid, Entry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Entry>> {
        // A panic while holding the lock cannot leave the map half-edited.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register(&self, job: &JobHandle) {
        let info = JobInfo {
            id: job.id(),
            description: job.description().to_string(),
            started_at: Utc::now(),
        };
        self.lock().insert(
            job.id(),
            Entry {
                info,
                canceller: job.canceller(),
            },
        );
    }

    /// Forget a finished job.  Returns false if it was not registered.
    pub fn complete(&self, id: Uuid) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Running jobs, oldest first.
    pub fn list(&self) -> Vec<JobInfo> {
        let mut jobs: Vec<JobInfo> = self.lock().values().map(|e| e.info.clone()).collect();
        jobs.sort_by_key(|j| j.started_at);
        jobs
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Request cancellation of one job.  The job stays listed until it finishes.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.lock().get(&id) {
            Some(entry) => {
                info!(job_id = %id, description = %entry.info.description, "Cancel requested");
                entry.canceller.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every job and clear the registry.  Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Entry> = self.lock().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.canceller.cancel();
        }
        drained.len()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::transfer::job::{spawn_engine, JobOptions};
    use crate::transfer::outcome::TransferOutcome;

    fn waiting_job() -> JobHandle {
        // Reports cancellation once anything arrives on stdin.
        let script = r#"read cmd; echo '{"StatusType":"EndOfJob","JobStatus":"Cancelled"}'"#;
        spawn_engine(
            "sh",
            &["-c".to_string(), script.to_string()],
            &[],
            "waiting job",
            JobOptions::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_register_list_cancel() {
        let registry = JobRegistry::new();
        let job = waiting_job();
        let id = job.id();
        registry.register(&job);

        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].description, "waiting job");

        assert!(registry.cancel(id));
        assert!(!registry.cancel(Uuid::new_v4()));
        let classification = job.run_to_completion(|_| {}).await;
        assert_eq!(classification.outcome, TransferOutcome::Cancelled);

        assert!(registry.complete(id));
        assert!(!registry.complete(id));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let registry = JobRegistry::new();
        let jobs = vec![waiting_job(), waiting_job()];
        for job in &jobs {
            registry.register(job);
        }
        assert_eq!(registry.cancel_all(), 2);
        assert!(registry.is_empty());
        for job in jobs {
            let c = job.run_to_completion(|_| {}).await;
            assert_eq!(c.outcome, TransferOutcome::Cancelled);
        }
    }
}

//! azexplorer library -- core of an Azure Storage explorer.
//!
//! This crate provides the pieces of the explorer with precise contracts:
//! the path algebra over flat blob keys, the resource URI codec, and the
//! azcopy transfer pipeline (status parsing, outcome classification,
//! progress tracking and subprocess management).

pub mod config;
pub mod errors;
pub mod metrics;
pub mod paths;
pub mod transfer;
pub mod uri;

use tracing::info;

use crate::config::Config;
use crate::errors::Result;
use crate::transfer::job::{spawn_copy, JobHandle, TransferEvent};
use crate::transfer::outcome::Classification;
use crate::transfer::registry::JobRegistry;
use crate::transfer::CopyCommand;
use crate::uri::ResourceUriCodec;

/// Process-scoped explorer state.
///
/// Created by [`ExplorerState::activate`] and torn down by
/// [`ExplorerState::deactivate`]; front ends hold it for their lifetime
/// instead of reaching for globals.
pub struct ExplorerState {
    /// Loaded configuration.
    pub config: Config,
    /// Codec for the configured URI scheme.
    pub codec: ResourceUriCodec,
    /// Running transfer jobs.
    pub jobs: JobRegistry,
}

impl ExplorerState {
    pub fn activate(config: Config) -> Self {
        if config.observability.metrics && crate::metrics::init_metrics().is_some() {
            crate::metrics::describe_metrics();
        }
        let codec = ResourceUriCodec::new(config.uri.scheme.clone());
        info!(
            azcopy = %config.transfer.azcopy_path,
            scheme = %codec.scheme(),
            "Explorer activated"
        );
        Self {
            config,
            codec,
            jobs: JobRegistry::new(),
        }
    }

    /// Spawn azcopy for `command` and register the job.
    pub fn start_transfer(&self, command: &CopyCommand) -> Result<JobHandle> {
        let job = spawn_copy(command, &self.config.transfer)?;
        self.jobs.register(&job);
        Ok(job)
    }

    /// Drive a job started with [`start_transfer`](Self::start_transfer) to
    /// the end and unregister it.
    pub async fn finish_transfer<F>(&self, job: JobHandle, on_event: F) -> Classification
    where
        F: FnMut(&TransferEvent),
    {
        let id = job.id();
        let classification = job.run_to_completion(on_event).await;
        self.jobs.complete(id);
        classification
    }

    /// Cancel everything still running.
    pub fn deactivate(self) {
        let cancelled = self.jobs.cancel_all();
        info!(cancelled, "Explorer deactivated");
    }
}

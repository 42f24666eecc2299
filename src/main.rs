//! azexplorer -- command-line front end for the explorer core.
//!
//! Runs azcopy transfers with live progress, replays recorded status logs,
//! and exposes the path and URI helpers for scripting.  Logs go to stderr;
//! results and notifications go to stdout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use azexplorer::config::{Config, LoggingConfig};
use azexplorer::transfer::job::JobCanceller;
use azexplorer::transfer::{
    consume_lines, Classification, CopyCommand, FromTo, Overwrite, TransferEvent,
    TransferLocation,
};
use azexplorer::{paths, ExplorerState};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "azexplorer.yaml";

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "azexplorer",
    version,
    about = "Azure Storage explorer: azcopy transfers, blob paths, resource URIs"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an azcopy transfer and report its outcome.
    Transfer {
        /// Local path or blob/file-share URL (SAS token in the query).
        #[arg(long)]
        source: String,
        /// Local path or blob/file-share URL (SAS token in the query).
        #[arg(long)]
        destination: String,
        /// azcopy --from-to pairing, e.g. LocalBlob or BlobLocal.
        #[arg(long)]
        from_to: FromTo,
        /// Transfer directories recursively.
        #[arg(short, long)]
        recursive: bool,
        /// Overwrite policy for existing destination entries.
        #[arg(long, value_enum, default_value_t = OverwriteArg::True)]
        overwrite: OverwriteArg,
        /// Exclude entries matching this pattern (repeatable).
        #[arg(long)]
        exclude: Vec<String>,
        /// Write Prometheus metrics here when the job ends.
        #[arg(long)]
        metrics_out: Option<PathBuf>,
    },
    /// Classify a recorded azcopy status log (one JSON object per line).
    Replay {
        /// File with the captured azcopy stdout.
        file: PathBuf,
    },
    /// Apply a path-algebra operation to a blob key.
    Path {
        #[arg(value_enum)]
        op: PathOp,
        path: String,
    },
    /// Encode or decode resource URIs.
    Uri {
        #[command(subcommand)]
        command: UriCommand,
    },
}

#[derive(Subcommand, Debug)]
enum UriCommand {
    /// Build the URI for a file inside a resource.
    Encode { resource_id: String, path: String },
    /// Split a URI into resource id and file path.
    Decode { uri: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PathOp {
    Dirname,
    Basename,
    Trim,
    Append,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OverwriteArg {
    True,
    False,
    IfSourceNewer,
}

impl From<OverwriteArg> for Overwrite {
    fn from(arg: OverwriteArg) -> Self {
        match arg {
            OverwriteArg::True => Overwrite::True,
            OverwriteArg::False => Overwrite::False,
            OverwriteArg::IfSourceNewer => Overwrite::IfSourceNewer,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match resolve_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("azexplorer: {:#}", e);
            return ExitCode::from(2);
        }
    };
    init_tracing(&config.logging);

    match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Explicit `--config` must exist; the implicit default file is optional.
fn resolve_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    match explicit {
        Some(path) => azexplorer::config::load_config(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            azexplorer::config::load_config(DEFAULT_CONFIG_FILE)
                .with_context(|| format!("loading configuration from {}", DEFAULT_CONFIG_FILE))
        }
        None => Ok(Config::default()),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(command: Command, config: Config) -> anyhow::Result<ExitCode> {
    match command {
        Command::Transfer {
            source,
            destination,
            from_to,
            recursive,
            overwrite,
            exclude,
            metrics_out,
        } => {
            let mut copy = CopyCommand::new(
                TransferLocation::parse(&source),
                TransferLocation::parse(&destination),
                from_to,
            )?
            .recursive(recursive)
            .overwrite(overwrite.into());
            for pattern in exclude {
                copy = copy.exclude(pattern);
            }

            let state = ExplorerState::activate(config);
            let job = state.start_transfer(&copy)?;
            let description = job.description().to_string();
            info!(job_id = %job.id(), "{} started", description);

            let signals = tokio::spawn(cancel_on_signal(job.canceller()));
            let classification = state.finish_transfer(job, print_event).await;
            signals.abort();
            state.deactivate();

            report(&classification, &description);
            if let Some(path) = metrics_out {
                let text = azexplorer::metrics::render().unwrap_or_default();
                std::fs::write(&path, text)
                    .with_context(|| format!("writing metrics to {}", path.display()))?;
            }
            Ok(exit_code(&classification))
        }
        Command::Replay { file } => {
            let input = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("opening {}", file.display()))?;
            let (tx, mut rx) = tokio::sync::mpsc::channel(config.transfer.event_buffer.max(1));
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    print_event(&event);
                }
            });
            let classification = consume_lines(tokio::io::BufReader::new(input), &tx).await?;
            drop(tx);
            printer.await?;

            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            report(&classification, &format!("Transfer '{}'", name));
            Ok(exit_code(&classification))
        }
        Command::Path { op, path } => {
            let result = match op {
                PathOp::Dirname => paths::dirname(&path).to_string(),
                PathOp::Basename => paths::basename(&path).to_string(),
                PathOp::Trim => paths::trim_slash(&path).to_string(),
                PathOp::Append => paths::append_slash(&path),
            };
            println!("{}", result);
            Ok(ExitCode::SUCCESS)
        }
        Command::Uri { command } => {
            let codec = azexplorer::uri::ResourceUriCodec::new(config.uri.scheme);
            match command {
                UriCommand::Encode { resource_id, path } => {
                    println!("{}", codec.encode(&resource_id, &path));
                }
                UriCommand::Decode { uri } => {
                    let parsed = codec.decode(&uri)?;
                    println!("resourceId:    {}", parsed.resource_id);
                    println!("filePath:      {}", parsed.file_path);
                    println!("parentDirPath: {}", parsed.parent_dir_path);
                    println!("baseName:      {}", parsed.base_name);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_event(event: &TransferEvent) {
    match event {
        TransferEvent::Status { update, .. } => info!("{}", update.message),
        TransferEvent::Message { kind, content } => info!(kind = ?kind, "{}", content),
        TransferEvent::Finished(_) => {}
    }
}

/// Print the notification and the failed/skipped lists.
fn report(classification: &Classification, description: &str) {
    println!("{}", classification.user_message(description));
    for item in &classification.failed {
        println!("  failed:  {} -> {} ({})", item.src, item.dst, item.transfer_status);
    }
    for item in &classification.skipped {
        println!("  skipped: {} -> {} ({})", item.src, item.dst, item.transfer_status);
    }
    if let Some(mismatch) = &classification.mismatch {
        println!(
            "  note: engine reported {} but the transfer lists indicate {}",
            mismatch.reported, mismatch.derived
        );
    }
}

fn exit_code(classification: &Classification) -> ExitCode {
    if classification.outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

/// Forward SIGINT / SIGTERM to the job as a cancel request.
async fn cancel_on_signal(canceller: JobCanceller) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, cancelling transfer"),
        _ = terminate => info!("Received SIGTERM, cancelling transfer"),
    }
    canceller.cancel();
}

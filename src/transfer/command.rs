//! azcopy command-line construction.
//!
//! Every job is launched as `azcopy copy <src> <dst> ...` with JSON output
//! and `--cancel-from-stdin`, so the job runner can both parse status lines
//! and ask the engine to stop by writing `cancel` to its stdin.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::{ExplorerError, Result};

/// One end of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferLocation {
    Local(PathBuf),
    /// Blob or file-share URL; the SAS token (without `?`) is appended when present.
    Remote {
        url: String,
        sas_token: Option<String>,
    },
}

impl TransferLocation {
    /// Treat anything starting with `http(s)://` as remote.
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("https://") || lower.starts_with("http://") {
            match raw.split_once('?') {
                Some((url, sas)) if !sas.is_empty() => TransferLocation::Remote {
                    url: url.to_string(),
                    sas_token: Some(sas.to_string()),
                },
                _ => TransferLocation::Remote {
                    url: raw.trim_end_matches('?').to_string(),
                    sas_token: None,
                },
            }
        } else {
            TransferLocation::Local(PathBuf::from(raw))
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            TransferLocation::Local(_) => "local",
            TransferLocation::Remote { .. } => "remote",
        }
    }

    fn is_local(&self) -> bool {
        matches!(self, TransferLocation::Local(_))
    }

    /// Argument form handed to azcopy.
    pub fn to_arg(&self) -> String {
        match self {
            TransferLocation::Local(path) => path.to_string_lossy().into_owned(),
            TransferLocation::Remote {
                url,
                sas_token: Some(sas),
            } => format!("{}?{}", url, sas.trim_start_matches('?')),
            TransferLocation::Remote { url, sas_token: None } => url.clone(),
        }
    }

    /// Same as [`to_arg`](Self::to_arg) but with the SAS token masked, for logs.
    pub fn redacted(&self) -> String {
        match self {
            TransferLocation::Remote {
                url,
                sas_token: Some(_),
            } => format!("{}?<SAS>", url),
            other => other.to_arg(),
        }
    }
}

/// azcopy `--from-to` pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FromTo {
    LocalBlob,
    BlobLocal,
    LocalFile,
    FileLocal,
    BlobBlob,
    FileFile,
    BlobFile,
    FileBlob,
}

impl FromTo {
    pub fn as_str(self) -> &'static str {
        match self {
            FromTo::LocalBlob => "LocalBlob",
            FromTo::BlobLocal => "BlobLocal",
            FromTo::LocalFile => "LocalFile",
            FromTo::FileLocal => "FileLocal",
            FromTo::BlobBlob => "BlobBlob",
            FromTo::FileFile => "FileFile",
            FromTo::BlobFile => "BlobFile",
            FromTo::FileBlob => "FileBlob",
        }
    }

    /// Whether (source, destination) are expected to be local.
    fn local_ends(self) -> (bool, bool) {
        match self {
            FromTo::LocalBlob | FromTo::LocalFile => (true, false),
            FromTo::BlobLocal | FromTo::FileLocal => (false, true),
            _ => (false, false),
        }
    }

    /// Short verb for notifications.
    pub fn verb(self) -> &'static str {
        match self.local_ends() {
            (true, false) => "Upload",
            (false, true) => "Download",
            _ => "Copy",
        }
    }
}

impl fmt::Display for FromTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FromTo {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let all = [
            FromTo::LocalBlob,
            FromTo::BlobLocal,
            FromTo::LocalFile,
            FromTo::FileLocal,
            FromTo::BlobBlob,
            FromTo::FileFile,
            FromTo::BlobFile,
            FromTo::FileBlob,
        ];
        all.into_iter()
            .find(|ft| ft.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown --from-to value '{}'", s))
    }
}

/// azcopy `--overwrite` policy.
///
/// azcopy's `prompt` mode reads answers from stdin, which is reserved for
/// `--cancel-from-stdin`, so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overwrite {
    #[default]
    True,
    False,
    IfSourceNewer,
}

impl Overwrite {
    fn as_str(self) -> &'static str {
        match self {
            Overwrite::True => "true",
            Overwrite::False => "false",
            Overwrite::IfSourceNewer => "ifSourceNewer",
        }
    }
}

/// A fully described `azcopy copy` invocation.
#[derive(Debug, Clone)]
pub struct CopyCommand {
    pub source: TransferLocation,
    pub destination: TransferLocation,
    pub from_to: FromTo,
    pub recursive: bool,
    pub overwrite: Overwrite,
    pub exclude_patterns: Vec<String>,
    pub log_level: String,
}

impl CopyCommand {
    /// Build a command, checking that `from_to` matches the location kinds.
    pub fn new(
        source: TransferLocation,
        destination: TransferLocation,
        from_to: FromTo,
    ) -> Result<Self> {
        let (src_local, dst_local) = from_to.local_ends();
        if src_local != source.is_local() || dst_local != destination.is_local() {
            return Err(ExplorerError::InvalidFromTo {
                from_to: from_to.to_string(),
                source_kind: source.kind(),
                destination_kind: destination.kind(),
            });
        }
        Ok(Self {
            source,
            destination,
            from_to,
            recursive: false,
            overwrite: Overwrite::default(),
            exclude_patterns: Vec::new(),
            log_level: "INFO".to_string(),
        })
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn overwrite(mut self, overwrite: Overwrite) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Human-readable description, e.g. `Upload of 'photos'`.
    pub fn describe(&self) -> String {
        let name = match &self.source {
            TransferLocation::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned()),
            TransferLocation::Remote { url, .. } => {
                let trimmed = crate::paths::trim_slash(url);
                crate::paths::basename(trimmed).to_string()
            }
        };
        format!("{} of '{}'", self.from_to.verb(), name)
    }

    /// Arguments after the program name.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "copy".to_string(),
            self.source.to_arg(),
            self.destination.to_arg(),
            format!("--from-to={}", self.from_to),
            format!("--overwrite={}", self.overwrite.as_str()),
        ];
        if self.recursive {
            args.push("--recursive".to_string());
        }
        if !self.exclude_patterns.is_empty() {
            args.push(format!("--exclude-pattern={}", self.exclude_patterns.join(";")));
        }
        args.push("--output-type=json".to_string());
        args.push("--cancel-from-stdin".to_string());
        args.push(format!("--log-level={}", self.log_level));
        args
    }
}

//! Fatal errors that abort a verification run before any partition starts.
//!
//! Partition-level failures are not errors: they are classified exit codes
//! (see [`crate::retry::ExitClass`]) that only affect the aggregate report.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Missing or inconsistent settings.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A required external client is not installed on this host.
    #[error("missing dependency: {dependency} ({reason})")]
    MissingDependency { dependency: String, reason: String },

    /// The backup could not tell us its latest version.
    #[error("upstream unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// Filesystem setup failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl VerifyError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn missing_dependency(dependency: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingDependency {
            dependency: dependency.into(),
            reason: reason.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable reason code.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration_error",
            Self::MissingDependency { .. } => "missing_dependency",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::Io { .. } => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, VerifyError>;

//! CLI error handling with semantic exit codes.
//!
//! Errors are categorized so scripts can react to the kind of failure rather
//! than parse messages.
//!
//! # Exit Code Categories
//!
//! | Code | Category | Description |
//! |------|----------|-------------|
//! | 0 | Success | Command completed successfully |
//! | 1 | `Internal` | Unexpected/internal error |
//! | 2 | `Usage` | Invalid arguments, configuration or workflow file |
//! | 3 | `NotFound` | A file or source does not exist |
//! | 4 | `Content` | A page could not be parsed or a record was rejected |
//! | 5 | `Network` | Network or fetch failure |
//! | 6 | `Timeout` | Operation timed out |
//! | 7 | `Graph` | Dependency or pagination cycle, invalid dependency |
//!
//! # Usage
//!
//! ```bash
//! pagewalk run bills.toml > bills.jsonl
//! case $? in
//!     0) echo "done" ;;
//!     5|6) echo "site unreachable, retry later" ;;
//!     *) echo "workflow needs fixing" ;;
//! esac
//! ```

use pagewalk_core::Error as CoreError;
use std::fmt;
use std::process::ExitCode;

/// Semantic error category determining the exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Unexpected or internal error (exit code 1).
    Internal = 1,

    /// Invalid arguments, configuration or workflow file (exit code 2).
    Usage = 2,

    /// A file or other named resource does not exist (exit code 3).
    NotFound = 3,

    /// Content did not have the expected shape (exit code 4).
    ///
    /// Parse failures and rejected records.
    Content = 4,

    /// Network or fetch failure (exit code 5).
    Network = 5,

    /// Operation timed out (exit code 6).
    Timeout = 6,

    /// The page graph is malformed (exit code 7).
    ///
    /// Dependency cycles, pagination cycles, dependencies that do not resolve
    /// to one item and pages without a source.
    Graph = 7,
}

impl ErrorCategory {
    /// Get the exit code for this category.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        self as u8
    }

    /// Create an `ExitCode` from this category.
    #[must_use]
    pub fn as_exit_code(self) -> ExitCode {
        ExitCode::from(self.exit_code())
    }

    /// Get a short description of this error category.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Internal => "internal error",
            Self::Usage => "usage error",
            Self::NotFound => "not found",
            Self::Content => "content error",
            Self::Network => "network error",
            Self::Timeout => "timeout",
            Self::Graph => "page graph error",
        }
    }

    /// Category of an engine error.
    #[must_use]
    pub fn from_core(err: &CoreError) -> Self {
        match err.root() {
            CoreError::Network(e) if e.is_timeout() => Self::Timeout,
            CoreError::Http { .. } | CoreError::Network(_) | CoreError::Offline(_) => {
                Self::Network
            },
            CoreError::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => Self::NotFound,
                std::io::ErrorKind::TimedOut => Self::Timeout,
                _ => Self::Internal,
            },
            CoreError::Parse(_) | CoreError::Validation(_) | CoreError::Serialization(_) => {
                Self::Content
            },
            CoreError::CyclicDependency { .. }
            | CoreError::InvalidDependency { .. }
            | CoreError::PaginationCycle { .. }
            | CoreError::MissingSource(_) => Self::Graph,
            CoreError::Config(_) => Self::Usage,
            CoreError::Skip(_) | CoreError::Page { .. } | CoreError::Shared(_) => Self::Internal,
        }
    }

    /// Infer the error category from an error message.
    ///
    /// Heuristic fallback for errors that were not categorized explicitly.
    #[must_use]
    pub fn infer_from_message(msg: &str) -> Self {
        let msg_lower = msg.to_lowercase();

        // Check timeouts before network so "connection timed out" lands here
        if msg_lower.contains("timeout") || msg_lower.contains("timed out") {
            return Self::Timeout;
        }

        if msg_lower.contains("network")
            || msg_lower.contains("connection")
            || msg_lower.contains("dns")
            || msg_lower.contains("http")
            || msg_lower.contains("fetch")
        {
            return Self::Network;
        }

        if msg_lower.contains("not found")
            || msg_lower.contains("no such")
            || msg_lower.contains("does not exist")
        {
            return Self::NotFound;
        }

        if msg_lower.contains("cycl") || msg_lower.contains("dependency") {
            return Self::Graph;
        }

        if msg_lower.contains("parse error") || msg_lower.contains("validation") {
            return Self::Content;
        }

        if msg_lower.contains("invalid argument")
            || msg_lower.contains("invalid value")
            || msg_lower.contains("workflow")
            || msg_lower.contains("config")
        {
            return Self::Usage;
        }

        Self::Internal
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A CLI error with a semantic category for exit code mapping.
///
/// Wraps an `anyhow::Error` so the full context chain is preserved.
#[derive(Debug)]
pub struct CliError {
    /// The semantic category of this error.
    pub category: ErrorCategory,
    /// The underlying error with full context.
    pub source: anyhow::Error,
}

impl CliError {
    /// Create a new CLI error with explicit category.
    pub fn new(category: ErrorCategory, source: impl Into<anyhow::Error>) -> Self {
        Self {
            category,
            source: source.into(),
        }
    }

    /// Create a usage error.
    pub fn usage(source: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorCategory::Usage, source)
    }

    /// Create a not-found error.
    pub fn not_found(source: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorCategory::NotFound, source)
    }

    /// Wrap an engine error, keeping its category.
    pub fn from_core(err: CoreError) -> Self {
        Self::new(ErrorCategory::from_core(&err), err)
    }

    /// Get the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.category.exit_code()
    }

    /// Create an `ExitCode` from this error.
    #[must_use]
    pub fn as_exit_code(&self) -> ExitCode {
        self.category.as_exit_code()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Determine the exit code from an `anyhow::Error`.
///
/// Explicit [`CliError`]s keep their category, engine errors are mapped by
/// kind, anything else is inferred from its message.
#[must_use]
pub fn exit_code_from_error(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }
    if let Some(core_err) = err.downcast_ref::<CoreError>() {
        return ErrorCategory::from_core(core_err).exit_code();
    }
    ErrorCategory::infer_from_message(&err.to_string()).exit_code()
}

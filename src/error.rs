//! Unified error types for the event pipeline.
//!
//! Decode- and assembly-level failures are absorbed inside the pipeline and
//! only reflected in data shape; the types here exist so those sites can log
//! and test precisely. Only transport failures and stalls terminate a run.

use std::fmt;

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// A wire frame could not be decoded. Recovered by skipping the frame.
#[derive(Debug)]
pub enum DecodeError {
    /// The frame body is not valid JSON.
    Malformed(String),
    /// The frame has no `type` tag.
    MissingType,
    /// The tag is unknown or required payload fields are absent.
    UnrecognizedEvent(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed frame: {msg}"),
            Self::MissingType => write!(f, "frame has no type tag"),
            Self::UnrecognizedEvent(msg) => write!(f, "unrecognized event: {msg}"),
        }
    }
}

impl std::error::Error for DecodeError {}

// ---------------------------------------------------------------------------
// AssemblyError
// ---------------------------------------------------------------------------

/// A streaming fragment event arrived out of protocol order.
///
/// Always recovered as a no-op; surfaced to the consolidated log as a warning
/// entry at most.
#[derive(Debug)]
pub enum AssemblyError {
    /// End-event with no matching open fragment (duplicate end, or start was
    /// never seen).
    UnmatchedEnd { id: String },
    /// Content/args event with no open fragment for its id.
    OrphanFragment { id: String },
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnmatchedEnd { id } => write!(f, "end event without open fragment: {id}"),
            Self::OrphanFragment { id } => write!(f, "fragment event without open fragment: {id}"),
        }
    }
}

impl std::error::Error for AssemblyError {}

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// The underlying event stream failed. Fatal to the run.
#[derive(Debug)]
pub enum TransportError {
    /// Network / reqwest-level error.
    Http(reqwest::Error),
    /// Non-2xx status from the backend.
    Status(u16, String),
    /// Transport closed or misbehaved outside HTTP semantics.
    Stream(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "http: {e}"),
            Self::Status(code, body) => write!(f, "status {code}: {body}"),
            Self::Stream(msg) => write!(f, "stream: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing client configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// RunError — top-level
// ---------------------------------------------------------------------------

/// Fatal run-level failure reported through `RunStatus::Error`.
#[derive(Debug)]
pub enum RunError {
    Transport(TransportError),
    /// No events within the configured stall window while running.
    Stalled { window_secs: u64 },
    /// The backend reported a run error event.
    Backend {
        message: String,
        code: Option<String>,
    },
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Stalled { window_secs } => {
                write!(f, "no events received for {window_secs}s while running")
            }
            Self::Backend { message, code } => match code {
                Some(code) => write!(f, "backend error [{code}]: {message}"),
                None => write!(f, "backend error: {message}"),
            },
        }
    }
}

impl std::error::Error for RunError {}

impl From<TransportError> for RunError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

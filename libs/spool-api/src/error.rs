use std::fmt;

/// Category of a plugin error. The engine maps each kind onto its own
/// error taxonomy, so backends only have to pick the right kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid plugin configuration.
    Config,
    /// Location is held by another handle, malformed, or already exists.
    Open,
    /// Location to read or append does not exist.
    NotFound,
    /// Topic already registered with a different type or format.
    Conflict,
    /// Record references a topic with no metadata in this container.
    TopicNotFound,
    /// `read_next` called with nothing left to read.
    EndOfStorage,
    /// Stored bytes cannot be parsed into a record.
    Corrupt,
    /// Message encode/decode failure.
    Format,
    /// Underlying write/read failure. Fatal to the current session.
    Io,
    /// Anything else (invalid state, generic).
    Logic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "config",
            ErrorKind::Open => "open",
            ErrorKind::NotFound => "not found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::TopicNotFound => "topic not found",
            ErrorKind::EndOfStorage => "end of storage",
            ErrorKind::Corrupt => "corrupt",
            ErrorKind::Format => "format",
            ErrorKind::Io => "io",
            ErrorKind::Logic => "logic",
        };
        f.write_str(s)
    }
}

/// Plugin error, returned by all storage and codec trait methods.
#[derive(Debug, Clone)]
pub struct PluginError {
    pub kind: ErrorKind,
    pub message: String,
}

impl PluginError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self { kind, message: msg.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn open(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Open, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, msg)
    }

    pub fn topic_not_found(topic: &str) -> Self {
        Self::new(ErrorKind::TopicNotFound, format!("topic '{topic}' has no metadata"))
    }

    pub fn end_of_storage() -> Self {
        Self::new(ErrorKind::EndOfStorage, "no more records")
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Corrupt, msg)
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, msg)
    }

    pub fn logic(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Logic, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Add context to the error, preserving the original ErrorKind.
    ///
    /// Produces: `"context: original message"`.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{ctx}: {}", self.message),
        }
    }
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for PluginError {}

// ---------------------------------------------------------------------------
// From impls: standard error types → PluginError with correct ErrorKind
// ---------------------------------------------------------------------------

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(e: serde_json::Error) -> Self {
        Self::format(e.to_string())
    }
}

impl From<std::str::Utf8Error> for PluginError {
    fn from(e: std::str::Utf8Error) -> Self {
        Self::format(e.to_string())
    }
}

impl From<std::string::FromUtf8Error> for PluginError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        Self::format(e.to_string())
    }
}

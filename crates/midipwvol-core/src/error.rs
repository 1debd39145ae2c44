// ── Core error types ──
//
// One enum per concern, all convertible into `CoreError`. Transient
// conditions (a truncated JSON prefix, a monitor restart) never surface
// here; everything below is either fatal to its task or reported to the
// caller that triggered it.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from the byte-stream framer. Both variants mean the stream is
/// out of sync with the producer and cannot be recovered in place.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream buffer grew to {len} bytes without a complete value (ceiling {ceiling})")]
    Overflow { len: usize, ceiling: usize },

    #[error("malformed JSON in monitor stream at byte {offset}: {message}")]
    Malformed { offset: usize, message: String },
}

/// Errors from supervising the monitor subprocess.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to launch {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("monitor pipe I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("unexpected monitor record shape: {message}")]
    Schema { message: String },
}

/// Errors raised while building or running a query.
///
/// These are deliberately loud: a filter that silently matched nothing
/// would hide a typo in a binding.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("unsupported filter value for '{attribute}': {kind}")]
    UnsupportedValue { attribute: String, kind: String },

    #[error("invalid pattern for '{attribute}': {source}")]
    InvalidPattern {
        attribute: String,
        #[source]
        source: regex::Error,
    },
}

/// Failure of a single outbound control call.
#[derive(Debug, Clone, Error)]
pub enum ControlError {
    #[error("control call failed (status {status:?}): {message}")]
    Failed {
        message: String,
        status: Option<i32>,
    },

    #[error("failed to run {program}: {message}")]
    Spawn { program: String, message: String },
}

impl ControlError {
    pub fn status(&self) -> Option<i32> {
        match self {
            Self::Failed { status, .. } => *status,
            Self::Spawn { .. } => None,
        }
    }
}

/// Errors from an input-event source.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("input read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input event on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors returned by an input handler. Any of them stops the dispatch loop.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("no object matched {description}")]
    NoMatch { description: String },

    #[error("{message}")]
    Failed { message: String },
}

/// Fatal conditions of the dispatch loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("input handler failed: {0}")]
    Handler(#[from] HandlerError),

    #[error("dispatch queue closed: all producers are gone")]
    QueueClosed,
}

/// Umbrella error for consumers that drive the whole pipeline.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<StreamError> for CoreError {
    fn from(err: StreamError) -> Self {
        Self::Monitor(MonitorError::Stream(err))
    }
}

//! Error taxonomy for a refresh run

use crate::stream::StreamError;

/// Failure while delivering encoded output
#[derive(Debug)]
pub enum SinkError {
    /// Local file I/O
    Io(std::io::Error),
    /// Object-store upload or signing
    Store(object_store::Error),
    /// CSV serialization
    Encode(csv::Error),
    /// The upload task ended without a result
    Closed(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Store(e) => write!(f, "object store: {e}"),
            Self::Encode(e) => write!(f, "CSV encode: {e}"),
            Self::Closed(msg) => write!(f, "upload aborted: {msg}"),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Closed(_) => None,
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<object_store::Error> for SinkError {
    fn from(e: object_store::Error) -> Self {
        Self::Store(e)
    }
}

impl From<csv::Error> for SinkError {
    fn from(e: csv::Error) -> Self {
        Self::Encode(e)
    }
}

/// Error from one refresh run (probe/fetch, parse, or delivery).
///
/// None of these are retried here; the stored indicator is left untouched
/// whenever one is returned.
#[derive(Debug)]
pub enum PipelineError {
    Fetch(StreamError),
    Parse(String),
    Sink(SinkError),
}

impl PipelineError {
    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Parse(_) => "parse",
            Self::Sink(_) => "sink",
        }
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "fetch failed: {e}"),
            Self::Parse(msg) => write!(f, "invalid feed: {msg}"),
            Self::Sink(e) => write!(f, "delivery failed: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Fetch(e) => Some(e),
            Self::Parse(_) => None,
            Self::Sink(e) => Some(e),
        }
    }
}

impl From<StreamError> for PipelineError {
    fn from(e: StreamError) -> Self {
        Self::Fetch(e)
    }
}

impl From<SinkError> for PipelineError {
    fn from(e: SinkError) -> Self {
        Self::Sink(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn kind_labels() {
        let fetch = PipelineError::Fetch(StreamError::Http {
            status: Some(502),
            message: "bad gateway".to_string(),
        });
        assert_eq!(fetch.kind(), "fetch");
        assert_eq!(PipelineError::Parse("x".into()).kind(), "parse");
        let sink = PipelineError::from(SinkError::Io(std::io::Error::other("disk")));
        assert_eq!(sink.kind(), "sink");
    }

    #[test]
    fn display_wraps_cause() {
        let err = PipelineError::Sink(SinkError::Io(std::io::Error::new(
            ErrorKind::PermissionDenied,
            "read-only",
        )));
        let msg = format!("{err}");
        assert!(msg.contains("delivery failed"));
        assert!(msg.contains("read-only"));
    }

    #[test]
    fn source_chain_present() {
        use std::error::Error;
        let err = PipelineError::from(StreamError::Io(std::io::Error::other("reset")));
        assert!(err.source().is_some());
        assert!(PipelineError::Parse("bad".into()).source().is_none());
    }
}

//! # Types
//!
//! Shared types for both stub servers

use std::fmt;

use thiserror::Error;

/// A shorthand for a Result whose error type is always a StubError.
pub type StubResult<T> = std::result::Result<T, StubError>;

/// `StubError` is a library-global error type to describe the different kinds of
/// errors that might occur while driving a stub server from a test.
#[derive(Debug, Error)]
pub enum StubError {
    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(std::io::Error),
    /// One or more registered expectations were never matched by an inbound request.
    /// Contains a description of every unmet expectation.
    #[error("Unsatisfied expectations: {0}")]
    UnsatisfiedExpectations(String),
    /// The stub was asked to stop but was never started, or was stopped already
    #[error("Server is not running")]
    NotRunning,
}

/// HTTP verbs accepted by the expectation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
}

impl Method {
    /// Get the verb as it appears on the request line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

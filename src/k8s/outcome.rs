//! Three-way classification of API reads.
//!
//! kube reports "not found" as an ordinary error; the checks in this crate
//! care about it as a distinct, often expected, answer.

use super::utils::status_name;
use kube::error::ErrorResponse;

/// Why a call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetail {
    /// The API server answered with a structured error
    Platform { code: u16, message: String },
    /// No usable answer came back (connection, TLS, decoding, retries exhausted)
    Transport(String),
}

impl ErrorDetail {
    /// Label used on the error counter
    #[must_use]
    pub fn metric_name(&self) -> String {
        match self {
            Self::Platform { code, .. } => status_name(*code),
            Self::Transport(_) => "max_retries_exceeded".to_string(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Platform { message, .. } | Self::Transport(message) => message,
        }
    }

    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::Platform { code, .. } => Some(*code),
            Self::Transport(_) => None,
        }
    }

    /// True when the server said the namespace itself is missing.
    #[must_use]
    pub fn is_namespace_gone(&self, namespace: &str) -> bool {
        match self {
            Self::Platform { code: 404, message } => {
                message.contains(&format!("namespaces \"{namespace}\" not found"))
            }
            _ => false,
        }
    }
}

impl From<ErrorResponse> for ErrorDetail {
    fn from(response: ErrorResponse) -> Self {
        Self::Platform {
            code: response.code,
            message: response.message,
        }
    }
}

impl From<kube::Error> for ErrorDetail {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) => response.into(),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// The result of reading a single object.
#[derive(Debug)]
pub enum Outcome<T> {
    Found(T),
    NotFound,
    Failed(ErrorDetail),
}

impl<T> Outcome<T> {
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<Result<T, kube::Error>> for Outcome<T> {
    fn from(result: Result<T, kube::Error>) -> Self {
        match result {
            Ok(value) => Self::Found(value),
            Err(kube::Error::Api(response)) if response.code == 404 => Self::NotFound,
            Err(e) => Self::Failed(e.into()),
        }
    }
}

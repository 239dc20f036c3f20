//! Classification of Central RPC failures
//!
//! Every failed call is turned into a [`CentralError`] that records the
//! status code, whether retrying can help and an actionable message naming
//! the failed operation. Only `Unavailable` and `DeadlineExceeded` are
//! retriable.

use std::error::Error as StdError;
use thiserror::Error;
use tonic::{Code, Status};

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Classified failure of a Central operation
#[derive(Error, Debug)]
#[error("{message}")]
pub struct CentralError {
    code: Code,
    retriable: bool,
    message: String,
    operation: String,
    #[source]
    source: BoxError,
}

impl CentralError {
    /// Classify a transport status
    pub fn from_status(status: Status, operation: &str) -> Self {
        let code = status.code();
        let message = format!(
            "{}: {} {}",
            base_message(operation),
            code_template(code),
            status.message()
        );

        Self {
            code,
            retriable: is_retriable(code),
            message,
            operation: operation.to_string(),
            source: Box::new(status),
        }
    }

    /// Classify an arbitrary error
    ///
    /// Errors carrying a `tonic::Status` are classified by code; anything
    /// else becomes a non-retriable `Unknown` wrapping the original text.
    pub fn new(err: impl Into<BoxError>, operation: &str) -> Self {
        let err: BoxError = err.into();
        match err.downcast::<Status>() {
            Ok(status) => Self::from_status(*status, operation),
            Err(err) => Self {
                code: Code::Unknown,
                retriable: false,
                message: format!("Unknown error: {}", err),
                operation: operation.to_string(),
                source: err,
            },
        }
    }

    /// Classify an optional error; no error in means no error out
    pub fn classify(err: Option<impl Into<BoxError>>, operation: &str) -> Option<Self> {
        err.map(|err| Self::new(err, operation))
    }

    /// Status code of the failure
    pub fn code(&self) -> Code {
        self.code
    }

    /// Whether retrying the call can succeed
    pub fn is_retriable(&self) -> bool {
        self.retriable
    }

    /// Human-readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Name of the failed operation
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

/// Whether a status code denotes a transient failure
pub fn is_retriable(code: Code) -> bool {
    matches!(code, Code::Unavailable | Code::DeadlineExceeded)
}

fn base_message(operation: &str) -> String {
    if operation.is_empty() {
        "Operation failed".to_string()
    } else {
        format!("Operation '{}' failed", operation)
    }
}

fn code_template(code: Code) -> String {
    let template = match code {
        Code::Unauthenticated => {
            "Authentication failed - invalid or expired API token. Please check your configuration."
        }
        Code::PermissionDenied => {
            "Permission denied - your API token does not have sufficient permissions for this operation."
        }
        Code::NotFound => "Resource not found - the requested resource does not exist.",
        Code::InvalidArgument => "Invalid argument - the request contains invalid parameters.",
        Code::Unavailable => {
            "StackRox Central is temporarily unavailable. The request will be retried automatically."
        }
        Code::DeadlineExceeded => {
            "Request timed out after 30 seconds. StackRox Central may be overloaded. The request will be retried automatically."
        }
        Code::ResourceExhausted => {
            "Resource exhausted - rate limit exceeded or server overloaded. The request will be retried automatically."
        }
        Code::Aborted => {
            "Operation aborted due to concurrency conflict. The request will be retried automatically."
        }
        Code::AlreadyExists => "Resource already exists.",
        Code::FailedPrecondition => {
            "Failed precondition - the system is not in the correct state for this operation."
        }
        Code::Unimplemented => {
            "Operation not implemented - this method is not available on the StackRox Central server."
        }
        Code::Cancelled => "Operation was cancelled.",
        Code::Unknown => "Unknown error occurred.",
        Code::Internal => {
            "Internal server error - an error occurred on the StackRox Central server."
        }
        other => return format!("Error code {:?}.", other),
    };
    template.to_string()
}

use thiserror::Error;

/// Accumulated validation failures for one operation call.
///
/// A validation pass records every failed requirement before surfacing them
/// together, so a caller sees the full list instead of the first failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentErrors(Vec<String>);

impl ArgumentErrors {
    pub fn new(errors: Vec<String>) -> Self {
        Self(errors)
    }

    pub fn messages(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for ArgumentErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("; "))
    }
}

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("invalid argument: {0}")]
    InvalidArgument(ArgumentErrors),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("infrastructure error: {0}")]
    Infrastructure(#[from] anyhow::Error),
}

impl DomainError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(ArgumentErrors::new(vec![message.into()]))
    }

    /// Infrastructure failures terminate the worker; everything else is
    /// handled per message.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Infrastructure(_))
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

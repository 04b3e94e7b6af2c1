use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::{
        analytics::AnalyticsError,
        repos::{RepoError, StoreError},
    },
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Error chain captured for logging, outermost message first.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub kind: ErrorKind,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, kind: ErrorKind, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            kind,
            messages,
        }
    }
}

/// How a failure should be treated by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input detected before any I/O. Retrying cannot help.
    InvalidArgument,
    /// The requested record does not exist.
    NotFound,
    /// The backing query layer failed while servicing a read.
    LoadFailure,
    /// The key-value store could not be reached or rejected the command.
    StoreUnavailable,
    /// Configuration, telemetry or other process-level failure.
    Internal,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl From<AnalyticsError> for AppError {
    fn from(error: AnalyticsError) -> Self {
        match error {
            AnalyticsError::InvalidArgument(err) => Self::Domain(err),
            AnalyticsError::Store(err) => Self::Store(err),
        }
    }
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Repo(RepoError::InvalidInput { .. }) => ErrorKind::InvalidArgument,
            AppError::Repo(RepoError::NotFound) => ErrorKind::NotFound,
            AppError::Repo(RepoError::Persistence(_) | RepoError::Timeout) => {
                ErrorKind::LoadFailure
            }
            AppError::Store(_) => ErrorKind::StoreUnavailable,
            AppError::Infra(_) | AppError::Unexpected(_) => ErrorKind::Internal,
        }
    }

    pub fn presentation_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::InvalidArgument => "Request could not be processed",
            ErrorKind::NotFound => "Post not found",
            ErrorKind::LoadFailure => "Post listing temporarily unavailable",
            ErrorKind::StoreUnavailable => "Analytics store temporarily unavailable",
            ErrorKind::Internal => "Unexpected error occurred",
        }
    }

    /// Process exit status for the command-line front end.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::InvalidArgument => 2,
            ErrorKind::NotFound => 4,
            ErrorKind::LoadFailure | ErrorKind::StoreUnavailable => 3,
            ErrorKind::Internal => 1,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self.kind(), self)
    }
}

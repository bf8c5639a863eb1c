//! Operational error context propagation with `anyhow`.
//!
//! This module provides extension traits and utilities for enhancing
//! error context and centralized error reporting.

use std::{error::Error as StdError, fmt::Display};

use {
    anyhow::{Context, Error, Result as AnyhowResult},
    tracing::{error, warn},
};

/// Extension trait for enhanced error context.
///
/// This trait provides methods to add contextual information to errors,
/// making debugging and user feedback more informative.
pub trait ResultExt<T, E> {
    /// Adds context to an error with a static string.
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;

    /// Adds context to an error with a formatted string.
    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.context(context)
    }

    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.context(format.to_string())
    }
}

/// Centralized error reporting and logging.
///
/// Background tasks (event annotation, reconciliation cycles) cannot return
/// their errors to anyone, so they report them here.
pub struct ErrorReporter;

impl ErrorReporter {
    /// Reports a recoverable issue, such as a file that could not be hashed.
    pub fn warn(error: &Error, context: &str) {
        warn!(context = context, error = %error, "Recoverable error");
    }

    /// Reports an issue that aborted a unit of work, such as a fatal cycle.
    pub fn error(error: &Error, context: &str) {
        error!(context = context, error = ?error, "Aborted");
    }

    /// Converts an error to a one-line message including its cause chain.
    ///
    /// # Arguments
    ///
    /// * `error` - Error to describe.
    ///
    /// # Returns
    ///
    /// The messages of the error chain joined with `": "`.
    pub fn to_user_message(error: &Error) -> String {
        error
            .chain()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(": ")
    }
}

#[cfg(test)]
mod tests {
    use std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
    };

    use anyhow::anyhow;

    use crate::error::operational::{ErrorReporter, ResultExt};

    #[derive(Debug)]
    struct TestError;

    impl Display for TestError {
        fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
            write!(f, "Test error")
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_result_ext_with_context() {
        let result: Result<i32, TestError> = Err(TestError);
        let error = result.add_context("Additional context").unwrap_err();
        assert!(error.to_string().contains("Additional context"));
    }

    #[test]
    fn test_result_ext_with_contextf() {
        let result: Result<i32, TestError> = Err(TestError);
        let error = result
            .add_contextf(format!("Replaying batch {}", 3))
            .unwrap_err();
        assert!(error.to_string().contains("Replaying batch 3"));
    }

    #[test]
    fn test_error_reporter_user_message_includes_causes() {
        let result: Result<i32, TestError> = Err(TestError);
        let error = result.add_context("Loading settings").unwrap_err();
        assert_eq!(
            ErrorReporter::to_user_message(&error),
            "Loading settings: Test error"
        );

        let error = anyhow!("Test error message");
        assert_eq!(ErrorReporter::to_user_message(&error), "Test error message");
    }
}

use std::panic::Location;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Uninitialized object: {0}")]
    Uninitialized(String),

    #[error("State violation: {0}")]
    StateViolation(String),

    #[error("{kind} '{name}' already exists")]
    NameCollision { kind: &'static str, name: String },

    #[error("Native runtime error {code}: {message} at [{file}, {line}]")]
    Native {
        code: i32,
        message: String,
        file: &'static str,
        line: u32,
    },

    #[error("Job '{job}' failed with exit code {code}{}", listing_hint(.listing))]
    ExternalProcess {
        job: String,
        code: i32,
        listing: Option<PathBuf>,
    },

    #[error(
        "Unmatched record limit exceeded while processing modifier {modifier} ({count} > {limit})"
    )]
    NoMatchLimitExceeded {
        modifier: String,
        count: usize,
        limit: usize,
    },

    #[error("Symbol '{0}' not found")]
    SymbolNotFound(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn listing_hint(listing: &Option<PathBuf>) -> String {
    match listing {
        Some(path) => format!(", see listing {}", path.display()),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl<T> From<std::sync::PoisonError<T>> for ModelError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Failure reported by the native runtime collaborator.
///
/// Carries only the collaborator's numeric code and message; the engine attaches
/// the call site when it converts this into a [`ModelError::Native`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub code: i32,
    pub message: String,
}

impl NativeError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Converts a runtime result, recording the caller's file and line.
#[track_caller]
pub fn check_native<T>(result: NativeResult<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(err) => {
            let location = Location::caller();
            Err(ModelError::Native {
                code: err.code,
                message: err.message,
                file: location.file(),
                line: location.line(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_native_records_call_site() {
        let err = check_native::<()>(Err(NativeError::new(7, "boom"))).unwrap_err();
        match err {
            ModelError::Native {
                code, file, line, ..
            } => {
                assert_eq!(code, 7);
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_external_process_message_mentions_listing() {
        let err = ModelError::ExternalProcess {
            job: "job1".into(),
            code: 2,
            listing: Some(PathBuf::from("/tmp/job1.lst")),
        };
        let text = err.to_string();
        assert!(text.contains("exit code 2"));
        assert!(text.contains("/tmp/job1.lst"));
    }
}

use std::fmt;

/// Broad class of a CLI failure, used to pick the exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad arguments or values the store rejected
    Usage,
    /// A referenced memory does not exist
    NotFound,
    Failure,
}

#[derive(Debug)]
pub struct CliError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CliError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Usage,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind {
            ErrorKind::Failure => 1,
            ErrorKind::Usage => 2,
            ErrorKind::NotFound => 3,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

impl From<String> for CliError {
    fn from(s: String) -> Self {
        CliError::usage(s)
    }
}

impl From<&str> for CliError {
    fn from(s: &str) -> Self {
        CliError::usage(s)
    }
}

impl From<lore::LoreError> for CliError {
    fn from(e: lore::LoreError) -> Self {
        let kind = if e.is_not_found() {
            ErrorKind::NotFound
        } else if e.is_validation() || matches!(e, lore::LoreError::Config(_)) {
            ErrorKind::Usage
        } else {
            ErrorKind::Failure
        };
        CliError {
            kind,
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::usage(format!("JSON error: {e}"))
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError {
            kind: ErrorKind::Failure,
            message: format!("IO error: {e}"),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

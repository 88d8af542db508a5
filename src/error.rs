//! Error taxonomy for the command engine.
//!
//! Every failure a command can produce is one of these variants. The engine
//! converts them into `Reply::Error` at its boundary, so none of them ever
//! escapes as a panic or tears down a connection.

use thiserror::Error;

/// Result type alias used by the key space and the command handlers
pub type Result<T> = std::result::Result<T, StoreError>;

/// Fieldless error category carried inside an error reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownCommand,
    Arity,
    WrongType,
    NoSuchKey,
    InvalidArgument,
    OutOfRange,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownCommand => "unknown_command",
            ErrorKind::Arity => "arity",
            ErrorKind::WrongType => "wrong_type",
            ErrorKind::NoSuchKey => "no_such_key",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::OutOfRange => "out_of_range",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    Arity(String),

    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("ERR no such key")]
    NoSuchKey,

    #[error("ERR {0}")]
    InvalidArgument(String),

    #[error("ERR {0}")]
    OutOfRange(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            StoreError::Arity(_) => ErrorKind::Arity,
            StoreError::WrongType => ErrorKind::WrongType,
            StoreError::NoSuchKey => ErrorKind::NoSuchKey,
            StoreError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            StoreError::OutOfRange(_) => ErrorKind::OutOfRange,
        }
    }

    pub(crate) fn not_integer() -> Self {
        StoreError::InvalidArgument("value is not an integer or out of range".into())
    }

    pub(crate) fn not_float() -> Self {
        StoreError::InvalidArgument("value is not a valid float".into())
    }

    pub(crate) fn syntax() -> Self {
        StoreError::InvalidArgument("syntax error".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_and_kinds() {
        let e = StoreError::UnknownCommand("foo".into());
        assert_eq!(e.to_string(), "ERR unknown command 'foo'");
        assert_eq!(e.kind(), ErrorKind::UnknownCommand);

        let e = StoreError::Arity("get".into());
        assert_eq!(e.to_string(), "ERR wrong number of arguments for 'get' command");

        assert!(StoreError::WrongType.to_string().starts_with("WRONGTYPE"));
        assert_eq!(StoreError::not_integer().kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            StoreError::OutOfRange("index out of range".into()).to_string(),
            "ERR index out of range"
        );
    }
}

// src/reply.rs

//! Typed command replies and their RESP2 encoding.
//!
//! The engine only ever produces a `Reply`; turning it into bytes is the
//! dispatcher's business (`Reply::to_resp`).

use crate::error::{ErrorKind, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `+OK`, `+PONG`
    Status(String),
    Error { kind: ErrorKind, message: String },
    Integer(i64),
    /// `None` is the null bulk string
    Bulk(Option<Vec<u8>>),
    Array(Vec<Reply>),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status("OK".into())
    }

    pub fn null() -> Self {
        Reply::Bulk(None)
    }

    pub fn bulk(bytes: impl Into<Vec<u8>>) -> Self {
        Reply::Bulk(Some(bytes.into()))
    }

    pub fn optional(bytes: Option<Vec<u8>>) -> Self {
        Reply::Bulk(bytes)
    }

    pub fn from_bool(b: bool) -> Self {
        Reply::Integer(b as i64)
    }

    /// Scores are sent as bulk strings in their shortest round-trip form
    pub fn score(score: f64) -> Self {
        Reply::bulk(format_score(score))
    }

    pub fn array_of_bulks(items: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Reply::Array(items.into_iter().map(Reply::bulk).collect())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error { .. })
    }

    /// Serialize to RESP2
    pub fn to_resp(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_resp(&mut out);
        out
    }

    fn write_resp(&self, out: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => {
                out.push(b'+');
                out.extend_from_slice(single_line(s).as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Error { message, .. } => {
                out.push(b'-');
                out.extend_from_slice(single_line(message).as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Reply::Integer(n) => out.extend_from_slice(format!(":{}\r\n", n).as_bytes()),
            Reply::Bulk(None) => out.extend_from_slice(b"$-1\r\n"),
            Reply::Bulk(Some(bytes)) => {
                out.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
                out.extend_from_slice(bytes);
                out.extend_from_slice(b"\r\n");
            }
            Reply::Array(items) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.write_resp(out);
                }
            }
        }
    }
}

impl From<StoreError> for Reply {
    fn from(err: StoreError) -> Self {
        Reply::Error { kind: err.kind(), message: err.to_string() }
    }
}

/// `1.5` -> "1.5", `3.0` -> "3", infinities -> "inf" / "-inf"
pub fn format_score(score: f64) -> String {
    format!("{}", score)
}

// simple strings and errors may not carry CR or LF
fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

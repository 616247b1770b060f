//! `cassandra-cql` error types.
use std::{fmt, io, str::Utf8Error};

use crate::config::ParseError;

/// A specialized [`Result`] type for `cassandra-cql` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible errors from `cassandra-cql`.
pub struct Error {
    context: String,
    kind: ErrorKind,
}

impl Error {
    /// The underlying error kind.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Attach extra context to an error while it propagates.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// All possible error kinds from `cassandra-cql`.
pub enum ErrorKind {
    /// Bad version, truncated frame, unknown result/opcode — fatal, closes the connection.
    ProtocolViolation(String),
    /// `OPCODE_ERROR` response carrying the server's error code and message.
    ServerError { code: i32, message: String },
    /// Unrecognised authenticator, or credentials required but missing.
    AuthError(String),
    /// A value was rejected by a codec (non-ASCII into ASCII, invalid UTF-8, ...).
    EncodingError(String),
    /// Unknown bind parameter name, or a position bound twice.
    BindingError(String),
    /// The handle was cancelled by the caller.
    Canceled,
    /// The underlying transport ended.
    TransportClosed,
    /// The connection was already closed when the call was made.
    ConnectionClosed,
    /// A config URL failed to parse.
    Config(ParseError),
    /// Transport I/O failure.
    Io(io::Error),
    /// TEXT/VARCHAR value was not valid UTF-8.
    Utf8(Utf8Error),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                Self { context: String::new(), kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<io::Error>e => ErrorKind::Io(e));
from!(<Utf8Error>e => ErrorKind::Utf8(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }
        fmt::Display::fmt(&self.kind, f)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {msg}"),
            Self::ServerError { code, message } => write!(f, "server error {code:#06x}: {message}"),
            Self::AuthError(msg) => write!(f, "authentication error: {msg}"),
            Self::EncodingError(msg) => write!(f, "encoding error: {msg}"),
            Self::BindingError(msg) => write!(f, "binding error: {msg}"),
            Self::Canceled => f.write_str("operation canceled"),
            Self::TransportClosed => f.write_str("transport closed"),
            Self::ConnectionClosed => f.write_str("connection closed"),
            Self::Config(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl Clone for ErrorKind {
    fn clone(&self) -> Self {
        match self {
            Self::ProtocolViolation(m) => Self::ProtocolViolation(m.clone()),
            Self::ServerError { code, message } => Self::ServerError { code: *code, message: message.clone() },
            Self::AuthError(m) => Self::AuthError(m.clone()),
            Self::EncodingError(m) => Self::EncodingError(m.clone()),
            Self::BindingError(m) => Self::BindingError(m.clone()),
            Self::Canceled => Self::Canceled,
            Self::TransportClosed => Self::TransportClosed,
            Self::ConnectionClosed => Self::ConnectionClosed,
            Self::Config(e) => Self::Config(e.clone()),
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::Utf8(e) => Self::Utf8(*e),
        }
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self { context: self.context.clone(), kind: self.kind.clone() }
    }
}

//! The [`Transport`] boundary the embedding runtime must satisfy (§6).
//!
//! The crate core never names a concrete socket type; it only requires a
//! duplex, unpin, send byte stream, the same shape as the teacher's
//! `PgTransport` trait boundary.
#[cfg(feature = "tokio")]
use tokio::io::{AsyncRead, AsyncWrite};

/// A byte-stream transport supplied by the embedding asynchronous I/O
/// runtime (out of scope per spec §1; only this contract is specified).
#[cfg(feature = "tokio")]
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

#[cfg(feature = "tokio")]
impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> Transport for T {}

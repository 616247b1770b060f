//! Cassandra Native Binary Protocol v1 client.
//!
//! A client library for the CQL binary protocol as it was defined for
//! Cassandra's v1 wire protocol (CQL v3): a frame codec, scalar type
//! encoding/decoding, column metadata, and a connection that multiplexes up
//! to 127 concurrent requests over a single TCP connection.
//!
//! # Examples
//!
//! ```no_run
//! use cassandra_cql::{Config, Connection, Consistency};
//!
//! # async fn app() -> cassandra_cql::Result<()> {
//! let conn = Connection::connect(Config::new("127.0.0.1").port(9042)).await?;
//!
//! let result = conn.query("SELECT id, name FROM users", Consistency::One).await?;
//! for i in 0..result.row_count().unwrap_or(0) {
//!     let row = result.row(i).unwrap();
//!     println!("{row:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Prepared statements bind by position or by name:
//!
//! ```no_run
//! use cassandra_cql::{Config, Connection, Consistency, Value};
//!
//! # async fn app() -> cassandra_cql::Result<()> {
//! let conn = Connection::connect(Config::new("127.0.0.1")).await?;
//! let stmt = conn.prepare("INSERT INTO users (id, name) VALUES (?, ?)").await?;
//! stmt.execute(vec![Value::Int(1), Value::Text("ada".into())], Consistency::Quorum).await?;
//! # Ok(())
//! # }
//! ```

pub(crate) mod common;

mod config;
mod error;
mod frame;
mod ident;
mod metadata;
mod protocol;
mod result;
mod types;

#[cfg(feature = "tokio")]
mod connection;
#[cfg(feature = "tokio")]
mod prepared;
#[cfg(feature = "tokio")]
mod transport;

pub use config::{Config, ParseError};
pub use error::{Error, ErrorKind, Result};
pub use frame::Frame;
pub use ident::{quote_ident, quote_literal};
pub use metadata::Metadata;
pub use protocol::{Consistency, Event, EventName, Opcode};
pub use result::QueryResult;
pub use types::{ColumnType, Value};

#[cfg(feature = "tokio")]
pub use connection::Connection;
#[cfg(feature = "tokio")]
pub use prepared::{Binding, PreparedStatement};
#[cfg(feature = "tokio")]
pub use transport::Transport;

//! The connection state machine (component 4.F): a single TCP connection
//! multiplexing up to 127 concurrent in-flight requests.
//!
//! [`Connection`] is a cheap, `Clone`-able handle around an actor task —
//! the same split as the teacher's `WorkerHandle`/`WorkerFuture`.
mod actor;
mod command;

use std::collections::BTreeMap;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::{
    common::verbose,
    config::Config,
    error::{Error, ErrorKind},
    frame::Frame,
    metadata::Metadata,
    protocol::{self, Consistency, Event, EventName, Opcode},
    result::{self, QueryResult},
    transport::Transport,
    types::Value,
};

use command::Command;

/// A handle to a live connection. Cloning is cheap: every clone shares the
/// same underlying actor task and stream table.
#[derive(Clone)]
pub struct Connection {
    send: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Connection")
    }
}

impl Connection {
    /// Connect to `config.host:config.port` over TCP and run the STARTUP/
    /// AUTHENTICATE handshake (tokio transport).
    pub async fn connect(config: Config) -> Result<Self, Error> {
        let addr = (config.host.as_str(), config.port);
        let stream = tokio::net::TcpStream::connect(addr).await?;
        Self::connect_with(config, stream).await
    }

    /// Run the handshake over a caller-supplied [`Transport`] (any duplex
    /// byte stream — a real socket, or `tokio::io::duplex` in tests).
    pub async fn connect_with<T: Transport>(config: Config, transport: T) -> Result<Self, Error> {
        let (send, recv) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(actor::run(transport, recv, config, ready_tx));
        ready_rx.await.map_err(|_| Error::from(ErrorKind::ConnectionClosed))??;
        Ok(Self { send })
    }

    async fn request(&self, opcode: Opcode, body: Frame) -> Result<(u8, Bytes), Error> {
        let (reply, recv) = oneshot::channel();
        self.send
            .send(Command::Send { opcode, body: body.into_rest(), reply })
            .map_err(|_| Error::from(ErrorKind::ConnectionClosed))?;
        recv.await.map_err(|_| Error::from(ErrorKind::ConnectionClosed))?
    }

    /// `OPTIONS` → `SUPPORTED`: the server's advertised options (CQL
    /// versions, compression algorithms, ...).
    pub async fn options(&self) -> Result<BTreeMap<String, Vec<String>>, Error> {
        let (opcode, body) = self.request(Opcode::Options, Frame::new()).await?;
        expect_opcode(opcode, Opcode::Supported)?;
        protocol::decode_supported(&mut Frame::from_shared(body))
    }

    /// Execute a CQL statement directly (no preparation).
    pub async fn query(&self, cql: &str, consistency: Consistency) -> Result<QueryResult, Error> {
        let (opcode, body) = self.request(Opcode::Query, protocol::query_body(cql, consistency)).await?;
        expect_opcode(opcode, Opcode::Result)?;
        result::decode(&mut Frame::from_shared(body))
    }

    /// Prepare a CQL statement server-side; returns the raw id and bind-
    /// parameter metadata used to build a [`crate::PreparedStatement`].
    pub(crate) async fn prepare_raw(&self, cql: &str) -> Result<(Bytes, Metadata), Error> {
        let (opcode, body) = self.request(Opcode::Prepare, protocol::prepare_body(cql)).await?;
        expect_opcode(opcode, Opcode::Result)?;
        match result::decode(&mut Frame::from_shared(body))? {
            QueryResult::Prepared { id, metadata } => Ok((id, metadata)),
            other => Err(ErrorKind::ProtocolViolation(format!("PREPARE did not return a Prepared result ({other:?})")).into()),
        }
    }

    /// Execute a previously prepared statement by its server-assigned id.
    pub(crate) async fn execute_raw(&self, id: &[u8], values: &[Option<Vec<u8>>], consistency: Consistency) -> Result<QueryResult, Error> {
        let (opcode, body) = self.request(Opcode::Execute, protocol::execute_body(id, values, consistency)).await?;
        expect_opcode(opcode, Opcode::Result)?;
        result::decode(&mut Frame::from_shared(body))
    }

    /// Encode typed positional bind values and execute, delegating codec
    /// work to `metadata`.
    pub async fn execute(&self, id: &[u8], metadata: &Metadata, values: &[Value], consistency: Consistency) -> Result<QueryResult, Error> {
        let encoded = metadata.encode_row(values)?;
        self.execute_raw(id, &encoded, consistency).await
    }

    /// Subscribe to server push events for `names`, issuing a `REGISTER`
    /// request and attaching a named sink for each.
    pub async fn register(&self, names: &[EventName]) -> Result<mpsc::UnboundedReceiver<Event>, Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.send
            .send(Command::Subscribe { names: names.to_vec(), sink: tx })
            .map_err(|_| Error::from(ErrorKind::ConnectionClosed))?;
        let (opcode, _body) = self.request(Opcode::Register, protocol::register_body(names)).await?;
        expect_opcode(opcode, Opcode::Ready)?;
        Ok(rx)
    }

    /// Attach the generic fallback sink: events whose name has no registered
    /// named sink are delivered here instead of being dropped.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        // best-effort: a closed actor simply means the sink is never used.
        let _ = self.send.send(Command::Subscribe { names: Vec::new(), sink: tx });
        rx
    }

    pub(crate) fn notify_prepared_evicted(&self, cql: String) {
        let _ = self.send.send(Command::EvictPrepared { cql });
    }

    /// Orderly teardown: every in-flight and queued request is failed with
    /// [`crate::ErrorKind::ConnectionClosed`], then the transport is dropped.
    pub fn close(&self) {
        verbose!("closing connection");
        let _ = self.send.send(Command::Close);
    }
}

fn expect_opcode(got: u8, want: Opcode) -> Result<(), Error> {
    if got == want.as_u8() {
        Ok(())
    } else {
        Err(ErrorKind::ProtocolViolation(format!("expected opcode {:#04x}, got {got:#04x}", want.as_u8())).into())
    }
}

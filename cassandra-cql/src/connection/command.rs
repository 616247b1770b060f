//! Messages sent from a [`Connection`][super::Connection] handle to its
//! actor task.
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::{error::Error, protocol::{Event, EventName, Opcode}};

pub(crate) type Reply = oneshot::Sender<Result<(u8, Bytes), Error>>;

pub(crate) enum Command {
    /// Send one request, correlate the response, and resolve `reply`.
    Send { opcode: Opcode, body: Bytes, reply: Reply },
    /// Attach an event sink for the given names (empty = generic fallback sink).
    Subscribe { names: Vec<EventName>, sink: mpsc::UnboundedSender<Event> },
    /// Evict a cached prepared statement by its CQL text (§4.G destructor notification).
    EvictPrepared { cql: String },
    /// Orderly teardown: fail every pending/queued handle and close the transport.
    Close,
}

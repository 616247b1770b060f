//! The connection actor task: owns the transport, the stream table, the
//! pending-request queue and the auth/event state, grounded on the teacher's
//! `pool::worker::WorkerFuture` shape (an `UnboundedReceiver` drained
//! alongside transport I/O, `oneshot` round trips back to callers).
use std::collections::{HashMap, VecDeque};

use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::{mpsc, oneshot},
};

use crate::{
    common::{verbose, warning},
    config::Config,
    error::{Error, ErrorKind},
    frame::Frame,
    protocol::{self, Consistency, Event, EventName, Opcode},
    transport::Transport,
};

use super::command::{Command, Reply};

/// Number of concurrent in-flight requests a single connection multiplexes
/// (stream ids `1..=127`; `0` and `-1`/`0xFF` are reserved, per §3/§6).
const SLOT_COUNT: usize = 127;

struct Queued {
    opcode: Opcode,
    body: Bytes,
    reply: Reply,
}

pub(crate) async fn run<T: Transport>(
    mut transport: T,
    mut commands: mpsc::UnboundedReceiver<Command>,
    config: Config,
    ready: oneshot::Sender<Result<(), Error>>,
) {
    let mut read_buf = BytesMut::new();

    match handshake(&mut transport, &config, &mut read_buf).await {
        Ok(()) => {
            if ready.send(Ok(())).is_err() {
                // caller already gave up; nothing left to serve.
                return;
            }
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    }

    let mut slots: Vec<Option<Reply>> = (0..SLOT_COUNT).map(|_| None).collect();
    let mut queue: VecDeque<Queued> = VecDeque::new();
    let mut sinks: HashMap<EventName, mpsc::UnboundedSender<Event>> = HashMap::new();
    let mut generic_sink: Option<mpsc::UnboundedSender<Event>> = None;

    loop {
        tokio::select! {
            cmd = commands.recv() => {
                match cmd {
                    None => {
                        verbose!("all connection handles dropped, closing");
                        break;
                    }
                    Some(Command::Close) => {
                        fail_all(&mut slots, &mut queue, ErrorKind::ConnectionClosed.into());
                        break;
                    }
                    Some(Command::Send { opcode, body, reply }) => {
                        send_or_queue(&mut transport, &mut slots, &mut queue, opcode, body, reply).await;
                    }
                    Some(Command::Subscribe { names, sink }) => {
                        if names.is_empty() {
                            generic_sink = Some(sink);
                        } else {
                            for name in names {
                                sinks.insert(name, sink.clone());
                            }
                        }
                    }
                    Some(Command::EvictPrepared { cql }) => {
                        verbose!(%cql, "prepared statement evicted by caller");
                    }
                }
            }
            frame = read_one_frame(&mut transport, &mut read_buf) => {
                match frame {
                    Ok((_version, _flags, stream_id, opcode, body)) => {
                        if !handle_incoming(stream_id, opcode, body, &mut slots, &mut queue, &sinks, &generic_sink, &mut transport).await {
                            break;
                        }
                    }
                    Err(err) => {
                        fail_all(&mut slots, &mut queue, err);
                        break;
                    }
                }
            }
        }
    }
}

/// STARTUP, optional AUTHENTICATE/CREDENTIALS, optional initial `USE`, all
/// strictly sequential on stream id 1 before the multiplexed loop starts.
async fn handshake<T: Transport>(transport: &mut T, config: &Config, buf: &mut BytesMut) -> Result<(), Error> {
    const HANDSHAKE_STREAM: i8 = 1;

    write_message(transport, protocol::encode_message(HANDSHAKE_STREAM, Opcode::Startup, protocol::startup_body())).await?;
    let (_, _, _, opcode, mut body) = read_one_frame(transport, buf).await?;

    match Opcode::from_u8(opcode) {
        Some(Opcode::Ready) => {}
        Some(Opcode::Authenticate) => {
            let authenticator = protocol::decode_authenticate(&mut body)?;
            if authenticator != "org.apache.cassandra.auth.PasswordAuthenticator" {
                return Err(ErrorKind::AuthError(format!("unsupported authenticator {authenticator:?}")).into());
            }
            let (user, password) = match (&config.user, &config.password) {
                (Some(u), Some(p)) => (u.as_str(), p.as_str()),
                _ => return Err(ErrorKind::AuthError("server requires credentials but none were configured".into()).into()),
            };
            write_message(transport, protocol::encode_message(HANDSHAKE_STREAM, Opcode::Credentials, protocol::credentials_body(user, password))).await?;
            let (_, _, _, opcode, mut body) = read_one_frame(transport, buf).await?;
            match Opcode::from_u8(opcode) {
                Some(Opcode::Ready) => {}
                Some(Opcode::Error) => {
                    let (code, message) = protocol::decode_error(&mut body)?;
                    return Err(ErrorKind::ServerError { code, message }.into());
                }
                _ => return Err(ErrorKind::ProtocolViolation(format!("unexpected opcode {opcode:#04x} after CREDENTIALS")).into()),
            }
        }
        Some(Opcode::Error) => {
            let (code, message) = protocol::decode_error(&mut body)?;
            return Err(ErrorKind::ServerError { code, message }.into());
        }
        _ => return Err(ErrorKind::ProtocolViolation(format!("unexpected opcode {opcode:#04x} after STARTUP")).into()),
    }

    if let Some(keyspace) = &config.keyspace {
        let cql = format!("USE {keyspace};");
        write_message(transport, protocol::encode_message(HANDSHAKE_STREAM, Opcode::Query, protocol::query_body(&cql, Consistency::One))).await?;
        let (_, _, _, opcode, mut body) = read_one_frame(transport, buf).await?;
        match Opcode::from_u8(opcode) {
            Some(Opcode::Result) => {
                crate::result::decode(&mut body)?;
            }
            Some(Opcode::Error) => {
                let (code, message) = protocol::decode_error(&mut body)?;
                return Err(ErrorKind::ServerError { code, message }.into());
            }
            _ => return Err(ErrorKind::ProtocolViolation(format!("unexpected opcode {opcode:#04x} after initial USE")).into()),
        }
    }

    Ok(())
}

/// Allocate a free stream id if one exists; otherwise append to the FIFO
/// pending queue (§5).
async fn send_or_queue<T: Transport>(
    transport: &mut T,
    slots: &mut [Option<Reply>],
    queue: &mut VecDeque<Queued>,
    opcode: Opcode,
    body: Bytes,
    reply: Reply,
) {
    match alloc_slot(slots) {
        Some(idx) => {
            if let Err(err) = dispatch(transport, idx, opcode, &body).await {
                // slot stays free; caller sees the failure directly.
                let _ = reply.send(Err(err));
                return;
            }
            slots[idx] = Some(reply);
        }
        None => queue.push_back(Queued { opcode, body, reply }),
    }
}

fn alloc_slot(slots: &[Option<Reply>]) -> Option<usize> {
    slots.iter().position(|s| s.is_none())
}

async fn dispatch<T: Transport>(transport: &mut T, idx: usize, opcode: Opcode, body: &Bytes) -> Result<(), Error> {
    let stream_id = (idx + 1) as i8;
    let frame = Frame::from_shared(body.clone());
    let msg = protocol::encode_message(stream_id, opcode, frame);
    write_message(transport, msg).await
}

/// Process one incoming frame. Returns `false` when the connection must stop
/// (a fatal error already drained everything).
#[allow(clippy::too_many_arguments)]
async fn handle_incoming<T: Transport>(
    stream_id: i8,
    opcode: u8,
    mut body: Frame,
    slots: &mut [Option<Reply>],
    queue: &mut VecDeque<Queued>,
    sinks: &HashMap<EventName, mpsc::UnboundedSender<Event>>,
    generic_sink: &Option<mpsc::UnboundedSender<Event>>,
    transport: &mut T,
) -> bool {
    match stream_id {
        0 if Opcode::from_u8(opcode) == Some(Opcode::Error) => {
            // Unsolicited server-side failure on the reserved stream: fatal
            // for the whole connection (§4.E).
            let err = match protocol::decode_error(&mut body) {
                Ok((code, message)) => ErrorKind::ServerError { code, message }.into(),
                Err(err) => err,
            };
            fail_all(slots, queue, err);
            false
        }
        0 => {
            // Anything else on the reserved stream is logged and discarded;
            // the connection stays open (§4.E demux table).
            warning!(opcode, "unexpected message on reserved stream 0, discarding");
            true
        }
        -1 => {
            dispatch_event(opcode, body, sinks, generic_sink);
            true
        }
        id if id >= 1 && (id as usize) <= SLOT_COUNT => {
            let idx = id as usize - 1;
            let Some(reply) = slots[idx].take() else {
                warning!(stream_id = id, "response for a stream with no pending request, discarding");
                return true;
            };

            let result = match Opcode::from_u8(opcode) {
                Some(Opcode::Error) => match protocol::decode_error(&mut body) {
                    Ok((code, message)) => Err(ErrorKind::ServerError { code, message }.into()),
                    Err(err) => Err(err),
                },
                Some(_) => Ok((opcode, body.into_rest())),
                None => Err(ErrorKind::ProtocolViolation(format!("unknown opcode {opcode:#04x}")).into()),
            };
            let _ = reply.send(result);

            if let Some(next) = queue.pop_front() {
                if let Err(err) = dispatch(transport, idx, next.opcode, &next.body).await {
                    let _ = next.reply.send(Err(err));
                } else {
                    slots[idx] = Some(next.reply);
                }
            }
            true
        }
        other => {
            warning!(stream_id = other, "message on an out-of-range stream id, discarding");
            true
        }
    }
}

fn dispatch_event(
    opcode: u8,
    mut body: Frame,
    sinks: &HashMap<EventName, mpsc::UnboundedSender<Event>>,
    generic_sink: &Option<mpsc::UnboundedSender<Event>>,
) {
    if Opcode::from_u8(opcode) != Some(Opcode::Event) {
        warning!(opcode, "unexpected opcode on the event stream, discarding");
        return;
    }
    let event = match protocol::decode_event(&mut body) {
        Ok(event) => event,
        Err(err) => {
            warning!(%err, "failed to decode event body, discarding");
            return;
        }
    };
    let name = match &event {
        Event::TopologyChange { .. } => EventName::TopologyChange,
        Event::StatusChange { .. } => EventName::StatusChange,
        Event::SchemaChange { .. } => EventName::SchemaChange,
    };
    if let Some(sink) = sinks.get(&name) {
        let _ = sink.send(event);
    } else if let Some(sink) = generic_sink {
        let _ = sink.send(event);
    } else {
        verbose!(?name, "event dropped, no sink registered");
    }
}

fn fail_all(slots: &mut [Option<Reply>], queue: &mut VecDeque<Queued>, err: Error) {
    for slot in slots.iter_mut() {
        if let Some(reply) = slot.take() {
            let _ = reply.send(Err(err.clone()));
        }
    }
    while let Some(queued) = queue.pop_front() {
        let _ = queued.reply.send(Err(err.clone()));
    }
}

async fn write_message<T: Transport>(transport: &mut T, msg: Bytes) -> Result<(), Error> {
    transport.write_all(&msg).await?;
    Ok(())
}

/// Read until a complete frame is available, growing `buf` as needed.
/// Enforces `version == 0x81` on every response (§3/§4.E): any other
/// version is a fatal protocol error.
async fn read_one_frame<T: Transport>(transport: &mut T, buf: &mut BytesMut) -> Result<(u8, u8, i8, u8, Frame), Error> {
    loop {
        if let Some(parsed) = Frame::parse(buf) {
            let version = parsed.0;
            if version != protocol::RESPONSE_VERSION {
                return Err(ErrorKind::ProtocolViolation(format!(
                    "bad response version {version:#04x}, expected {:#04x}",
                    protocol::RESPONSE_VERSION
                ))
                .into());
            }
            return Ok(parsed);
        }
        let n = transport.read_buf(buf).await?;
        if n == 0 {
            return Err(ErrorKind::TransportClosed.into());
        }
    }
}

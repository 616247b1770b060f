//! Dispatch on the result-kind tag of an `OPCODE_RESULT` body and build a
//! typed result (component 4.D).
use bytes::Bytes;

use crate::{
    error::{Error, ErrorKind},
    frame::Frame,
    metadata::Metadata,
    types::Value,
};

/// A decoded `OPCODE_RESULT` body.
#[derive(Debug)]
pub enum QueryResult {
    Void,
    Rows { metadata: Metadata, rows: Vec<Vec<Option<Bytes>>> },
    SetKeyspace(String),
    Prepared { id: Bytes, metadata: Metadata },
    SchemaChange { change_type: String, keyspace: String, table: String },
    /// A result kind this crate does not model; callers treat it as an error.
    Unknown { kind: i32, body: Bytes },
}

impl QueryResult {
    /// `Rows` variant: look up one fully-decoded row by index. Errors on an
    /// out-of-range index, a non-`Rows` result, or a codec failure (e.g.
    /// invalid UTF-8 in a TEXT column) rather than swallowing them as `None`.
    pub fn row(&self, index: usize) -> Result<Vec<Value>, Error> {
        match self {
            Self::Rows { metadata, rows } => {
                let row = rows.get(index).ok_or_else(|| {
                    ErrorKind::BindingError(format!("row index {index} out of range ({} rows)", rows.len()))
                })?;
                metadata.decode_row(row)
            }
            other => Err(ErrorKind::BindingError(format!("{other:?} is not a Rows result")).into()),
        }
    }

    /// Number of rows, if this is a `Rows` result.
    pub fn row_count(&self) -> Option<usize> {
        match self {
            Self::Rows { rows, .. } => Some(rows.len()),
            _ => None,
        }
    }
}

/// Parse an `OPCODE_RESULT` body: int kind, then a kind-specific payload.
pub fn decode(frame: &mut Frame) -> Result<QueryResult, Error> {
    let kind = frame.unpack_int()?;
    Ok(match kind {
        0x0001 => QueryResult::Void,
        0x0002 => {
            let metadata = Metadata::parse(frame)?;
            let row_count = frame.unpack_int()?.max(0) as usize;
            let col_count = metadata.count();
            let mut rows = Vec::with_capacity(row_count);
            for _ in 0..row_count {
                let mut row = Vec::with_capacity(col_count);
                for _ in 0..col_count {
                    row.push(frame.unpack_bytes()?);
                }
                rows.push(row);
            }
            QueryResult::Rows { metadata, rows }
        }
        0x0003 => QueryResult::SetKeyspace(frame.unpack_string()?),
        0x0004 => {
            let id = frame.unpack_short_bytes()?;
            let metadata = Metadata::parse(frame)?;
            QueryResult::Prepared { id, metadata }
        }
        0x0005 => {
            let change_type = frame.unpack_string()?;
            let keyspace = frame.unpack_string()?;
            let table = frame.unpack_string()?;
            QueryResult::SchemaChange { change_type, keyspace, table }
        }
        other => QueryResult::Unknown { kind: other, body: frame.clone().into_rest() },
    })
}

//! Prepared query handle (component 4.G): a server-side prepared statement
//! bound to positional or named parameters.
use std::collections::HashMap;

use bytes::Bytes;

use crate::{
    connection::Connection,
    error::{Error, ErrorKind},
    metadata::Metadata,
    protocol::Consistency,
    result::QueryResult,
    types::Value,
};

/// Bind values for [`PreparedStatement::execute`], either by position or by
/// bind-parameter name (resolved through the statement's own [`Metadata`]).
pub enum Binding {
    Positional(Vec<Value>),
    Named(HashMap<String, Value>),
}

impl From<Vec<Value>> for Binding {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

impl From<HashMap<String, Value>> for Binding {
    fn from(values: HashMap<String, Value>) -> Self {
        Self::Named(values)
    }
}

/// A statement prepared server-side. Dropping the handle notifies the
/// owning [`Connection`] so it can evict the CQL text from whatever
/// prepared-statement cache the caller keeps (§4.G) — a best-effort
/// notification that is silently dropped if the connection has already
/// gone away.
pub struct PreparedStatement {
    connection: Connection,
    cql: String,
    id: Bytes,
    metadata: Metadata,
}

impl PreparedStatement {
    pub(crate) fn new(connection: Connection, cql: String, id: Bytes, metadata: Metadata) -> Self {
        Self { connection, cql, id, metadata }
    }

    /// The CQL text this statement was prepared from.
    pub fn cql(&self) -> &str {
        &self.cql
    }

    /// Bind-parameter metadata, as returned by the server's `PREPARE`
    /// response.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Bind and execute.
    pub async fn execute(&self, binding: impl Into<Binding>, consistency: Consistency) -> Result<QueryResult, Error> {
        let values = self.resolve(binding.into())?;
        self.connection.execute(&self.id, &self.metadata, &values, consistency).await
    }

    fn resolve(&self, binding: Binding) -> Result<Vec<Value>, Error> {
        match binding {
            Binding::Positional(values) => Ok(values),
            Binding::Named(named) => {
                let mut slots: Vec<Option<Value>> = vec![None; self.metadata.count()];
                for (name, value) in named {
                    let idx = self
                        .metadata
                        .find_column(&name)
                        .ok_or_else(|| ErrorKind::BindingError(format!("unknown bind parameter {name:?}")))?;
                    if slots[idx].is_some() {
                        return Err(ErrorKind::BindingError(format!("parameter {name:?} bound more than once")).into());
                    }
                    slots[idx] = Some(value);
                }
                slots
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| {
                        v.ok_or_else(|| {
                            let name = self.metadata.column_shortname(i).unwrap_or("?").to_string();
                            ErrorKind::BindingError(format!("missing value for parameter {name:?}")).into()
                        })
                    })
                    .collect()
            }
        }
    }
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        self.connection.notify_prepared_evicted(std::mem::take(&mut self.cql));
    }
}

impl Connection {
    /// Prepare a CQL statement and wrap it in a [`PreparedStatement`] handle.
    pub async fn prepare(&self, cql: &str) -> Result<PreparedStatement, Error> {
        let (id, metadata) = self.prepare_raw(cql).await?;
        Ok(PreparedStatement::new(self.clone(), cql.to_string(), id, metadata))
    }
}

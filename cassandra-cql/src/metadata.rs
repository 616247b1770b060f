//! Column metadata: parsing, short-name derivation, and bulk row encode/decode
//! (component 4.C).
use bytes::Bytes;

use crate::{
    error::{Error, ErrorKind},
    frame::Frame,
    types::{self, ColumnType, Value},
};

const GLOBAL_TABLE_SPEC: i32 = 0x0001;

#[derive(Debug, Clone)]
struct Column {
    keyspace: String,
    table: String,
    name: String,
    ty: ColumnType,
    shortname: String,
}

/// An ordered set of column descriptors, with derived, collision-free short
/// names, plus bulk row encode/decode against the set's types.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    columns: Vec<Column>,
}

impl Metadata {
    /// Parse a metadata block: int flags, int column-count, optional global
    /// `(keyspace, table)` pair, then per-column descriptors.
    pub fn parse(frame: &mut Frame) -> Result<Self, Error> {
        let flags = frame.unpack_int()?;
        let count = frame.unpack_int()?;
        if count < 0 {
            return Err(ErrorKind::ProtocolViolation("negative column count".into()).into());
        }

        let global = if flags & GLOBAL_TABLE_SPEC != 0 {
            let keyspace = frame.unpack_string()?;
            let table = frame.unpack_string()?;
            Some((keyspace, table))
        } else {
            None
        };

        let mut columns = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (keyspace, table) = match &global {
                Some((k, t)) => (k.clone(), t.clone()),
                None => (frame.unpack_string()?, frame.unpack_string()?),
            };
            let name = frame.unpack_string()?;
            let ty = ColumnType::parse(frame)?;
            columns.push(Column { keyspace, table, name, ty, shortname: String::new() });
        }

        let mut metadata = Self { columns };
        metadata.derive_shortnames();
        Ok(metadata)
    }

    /// Single linear pass, O(n²) disambiguation: a column's short name is its
    /// bare name if unique; else `table.column` if that pair is unique; else
    /// the fully qualified `keyspace.table.column` triple.
    fn derive_shortnames(&mut self) {
        let n = self.columns.len();
        for i in 0..n {
            let name_dupes = self.columns.iter().filter(|c| c.name == self.columns[i].name).count();
            let shortname = if name_dupes == 1 {
                self.columns[i].name.clone()
            } else {
                let table_dupes = self
                    .columns
                    .iter()
                    .filter(|c| c.table == self.columns[i].table && c.name == self.columns[i].name)
                    .count();
                if table_dupes == 1 {
                    format!("{}.{}", self.columns[i].table, self.columns[i].name)
                } else {
                    format!(
                        "{}.{}.{}",
                        self.columns[i].keyspace, self.columns[i].table, self.columns[i].name
                    )
                }
            };
            self.columns[i].shortname = shortname;
        }
    }

    /// Number of columns.
    pub fn count(&self) -> usize {
        self.columns.len()
    }

    /// `(keyspace, table, column)` triple for column `i`.
    pub fn column_name(&self, i: usize) -> Option<(&str, &str, &str)> {
        self.columns.get(i).map(|c| (c.keyspace.as_str(), c.table.as_str(), c.name.as_str()))
    }

    /// Derived, collision-free short name for column `i`.
    pub fn column_shortname(&self, i: usize) -> Option<&str> {
        self.columns.get(i).map(|c| c.shortname.as_str())
    }

    /// Type descriptor for column `i`.
    pub fn column_type(&self, i: usize) -> Option<&ColumnType> {
        self.columns.get(i).map(|c| &c.ty)
    }

    /// Find a column by bare name or derived short name.
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.shortname == name || c.name == name)
    }

    /// Encode heterogeneous positional values as the `bytes` wire values that
    /// make up one row, delegating to the type codec per column.
    pub fn encode_row(&self, values: &[Value]) -> Result<Vec<Option<Vec<u8>>>, Error> {
        if values.len() != self.columns.len() {
            return Err(ErrorKind::BindingError(format!(
                "expected {} values, got {}",
                self.columns.len(),
                values.len()
            ))
            .into());
        }
        self.columns.iter().zip(values).map(|(c, v)| types::encode(&c.ty, v)).collect()
    }

    /// Decode one row's raw `bytes` values into typed [`Value`]s.
    pub fn decode_row(&self, values: &[Option<Bytes>]) -> Result<Vec<Value>, Error> {
        if values.len() != self.columns.len() {
            return Err(ErrorKind::ProtocolViolation(format!(
                "row has {} values, metadata declares {} columns",
                values.len(),
                self.columns.len()
            ))
            .into());
        }
        self.columns
            .iter()
            .zip(values)
            .map(|(c, v)| match v {
                None => Ok(Value::Null),
                Some(bytes) => types::decode(&c.ty, bytes),
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::BytesMut;

    fn build_metadata(cols: &[(&str, &str, &str, u16)]) -> Metadata {
        let mut frame = Frame::new();
        frame.pack_int(0); // no global table spec
        frame.pack_int(cols.len() as i32);
        for (ks, table, name, ty) in cols {
            frame.pack_string(ks);
            frame.pack_string(table);
            frame.pack_string(name);
            frame.pack_short(*ty);
        }
        let bytes: BytesMut = frame.into_rest().into();
        let mut frame = Frame::from_bytes(bytes);
        Metadata::parse(&mut frame).unwrap()
    }

    #[test]
    fn shortnames_disambiguate_by_scope() {
        // matches spec.md §8 scenario S8
        let md = build_metadata(&[("test", "table", "key", 0x0A), ("test", "table", "i", 0x09), ("test", "table", "b", 0x09)]);
        assert_eq!(md.column_shortname(0), Some("key"));
        assert_eq!(md.column_shortname(1), Some("i"));
        assert_eq!(md.column_shortname(2), Some("b"));
    }

    #[test]
    fn duplicate_names_fall_back_to_table_qualified() {
        let md = build_metadata(&[
            ("ks", "t1", "id", 0x09),
            ("ks", "t2", "id", 0x09),
        ]);
        assert_eq!(md.column_shortname(0), Some("t1.id"));
        assert_eq!(md.column_shortname(1), Some("t2.id"));

        let mut seen = std::collections::HashSet::new();
        for i in 0..md.count() {
            assert!(seen.insert(md.column_shortname(i).unwrap()), "short names must be unique");
        }
    }

    #[test]
    fn duplicate_table_qualified_falls_back_to_fully_qualified() {
        let md = build_metadata(&[
            ("ks1", "t", "id", 0x09),
            ("ks2", "t", "id", 0x09),
        ]);
        assert_eq!(md.column_shortname(0), Some("ks1.t.id"));
        assert_eq!(md.column_shortname(1), Some("ks2.t.id"));
    }

    #[test]
    fn find_column_by_shortname_or_name() {
        let md = build_metadata(&[("ks", "t", "a", 0x09), ("ks", "t", "b", 0x09)]);
        assert_eq!(md.find_column("a"), Some(0));
        assert_eq!(md.find_column("b"), Some(1));
        assert_eq!(md.find_column("missing"), None);
    }

    #[test]
    fn row_codec_round_trip() {
        let md = build_metadata(&[("ks", "t", "a", 0x0A), ("ks", "t", "b", 0x09)]);
        let row = vec![Value::Text("hello".into()), Value::Int(100)];
        let encoded = md.encode_row(&row).unwrap();
        let wire: Vec<Option<Bytes>> = encoded.into_iter().map(|o| o.map(Bytes::from)).collect();
        let decoded = md.decode_row(&wire).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn row_length_mismatch_is_an_error() {
        let md = build_metadata(&[("ks", "t", "a", 0x09)]);
        assert!(md.encode_row(&[]).is_err());
    }
}

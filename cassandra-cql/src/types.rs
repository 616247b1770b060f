//! CQL scalar type descriptors and the value codec registry (component 4.B).
use bytes::Bytes;

use crate::{
    error::{Error, ErrorKind},
    frame::Frame,
};

/// A CQL column type descriptor: a tagged union keyed by a u16 id.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Custom(String),
    Ascii,
    BigInt,
    Blob,
    Boolean,
    Counter,
    Decimal,
    Double,
    Float,
    Int,
    Text,
    Timestamp,
    Uuid,
    Varchar,
    Varint,
    TimeUuid,
    Inet,
    List(Box<ColumnType>),
    Map(Box<ColumnType>, Box<ColumnType>),
    Set(Box<ColumnType>),
    /// Forward-compatibility fallback for an id this crate does not model.
    Unknown(u16),
}

impl ColumnType {
    pub(crate) fn id(&self) -> u16 {
        match self {
            Self::Custom(_) => 0x00,
            Self::Ascii => 0x01,
            Self::BigInt => 0x02,
            Self::Blob => 0x03,
            Self::Boolean => 0x04,
            Self::Counter => 0x05,
            Self::Decimal => 0x06,
            Self::Double => 0x07,
            Self::Float => 0x08,
            Self::Int => 0x09,
            Self::Text => 0x0A,
            Self::Timestamp => 0x0B,
            Self::Uuid => 0x0C,
            Self::Varchar => 0x0D,
            Self::Varint => 0x0E,
            Self::TimeUuid => 0x0F,
            Self::Inet => 0x10,
            Self::List(_) => 0x20,
            Self::Map(_, _) => 0x21,
            Self::Set(_) => 0x22,
            Self::Unknown(id) => *id,
        }
    }

    /// Parse one type descriptor from the front of `frame`.
    pub(crate) fn parse(frame: &mut Frame) -> Result<Self, Error> {
        let id = frame.unpack_short()?;
        Ok(match id {
            0x00 => Self::Custom(frame.unpack_string()?),
            0x01 => Self::Ascii,
            0x02 => Self::BigInt,
            0x03 => Self::Blob,
            0x04 => Self::Boolean,
            0x05 => Self::Counter,
            0x06 => Self::Decimal,
            0x07 => Self::Double,
            0x08 => Self::Float,
            0x09 => Self::Int,
            0x0A => Self::Text,
            0x0B => Self::Timestamp,
            0x0C => Self::Uuid,
            0x0D => Self::Varchar,
            0x0E => Self::Varint,
            0x0F => Self::TimeUuid,
            0x10 => Self::Inet,
            0x20 => Self::List(Box::new(Self::parse(frame)?)),
            0x21 => {
                let k = Self::parse(frame)?;
                let v = Self::parse(frame)?;
                Self::Map(Box::new(k), Box::new(v))
            }
            0x22 => Self::Set(Box::new(Self::parse(frame)?)),
            other => Self::Unknown(other),
        })
    }
}

fn encoding_error(msg: impl Into<String>) -> Error {
    ErrorKind::EncodingError(msg.into()).into()
}

/// A decoded column or bind-parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Ascii(String),
    BigInt(i64),
    Blob(Bytes),
    Boolean(bool),
    Counter(i64),
    Decimal { scale: u32, unscaled: Vec<u8> },
    Double(f64),
    Float(f32),
    Int(i32),
    Text(String),
    /// Milliseconds since the Unix epoch (see DESIGN.md open question #2).
    Timestamp(u64),
    Varint(Vec<u8>),
    /// Value for a known-but-unimplemented type (UUID, INET, collections):
    /// the raw wire bytes, caller decodes further if it needs to.
    Raw(Bytes),
    /// Value for a column type id this crate has never heard of: the lowercase
    /// hex rendering of the raw wire bytes (§4.B unknown-type fallback).
    Unknown(String),
}

/// Encode one value for `ty` into a `bytes`-wire-type payload (the framing
/// layer writes the int length / -1-for-null wrapper around this).
pub fn encode(ty: &ColumnType, value: &Value) -> Result<Option<Vec<u8>>, Error> {
    if let Value::Null = value {
        return Ok(None);
    }

    let bytes = match (ty, value) {
        (ColumnType::Ascii, Value::Ascii(s)) | (ColumnType::Ascii, Value::Text(s)) => {
            if let Some(c) = s.bytes().find(|b| *b > 0x7F) {
                return Err(encoding_error(format!("non-ASCII byte 0x{c:02x} in ASCII value")));
            }
            s.clone().into_bytes()
        }
        (ColumnType::BigInt, Value::BigInt(n)) | (ColumnType::Counter, Value::Counter(n)) => {
            n.to_be_bytes().to_vec()
        }
        (ColumnType::Blob, Value::Blob(b)) => b.to_vec(),
        (ColumnType::Boolean, Value::Boolean(b)) => vec![if *b { 1 } else { 0 }],
        (ColumnType::Double, Value::Double(d)) => d.to_be_bytes().to_vec(),
        (ColumnType::Float, Value::Float(f)) => f.to_be_bytes().to_vec(),
        (ColumnType::Int, Value::Int(n)) => n.to_be_bytes().to_vec(),
        (ColumnType::Text, Value::Text(s)) | (ColumnType::Varchar, Value::Text(s)) => {
            s.clone().into_bytes()
        }
        (ColumnType::Timestamp, Value::Timestamp(ms)) => (*ms as i64).to_be_bytes().to_vec(),
        (ColumnType::Varint, Value::Varint(bytes)) => bytes.clone(),
        (ColumnType::Varint, Value::BigInt(n)) => encode_varint(*n as i128),
        (ColumnType::Varint, Value::Int(n)) => encode_varint(*n as i128),
        (ColumnType::Decimal, Value::Decimal { scale, unscaled }) => {
            let mut out = Vec::with_capacity(4 + unscaled.len());
            out.extend_from_slice(&scale.to_be_bytes());
            out.extend_from_slice(unscaled);
            out
        }
        (_, Value::Raw(b)) => b.to_vec(),
        (ty, value) => {
            return Err(encoding_error(format!("value {value:?} does not match column type {ty:?}")));
        }
    };

    Ok(Some(bytes))
}

/// Encode a signed integer as a minimal-length big-endian two's-complement
/// VARINT (§4.B / §8 invariant 4).
pub fn encode_varint(n: i128) -> Vec<u8> {
    if n >= 0 {
        encode_varint_magnitude(&n.to_be_bytes(), false)
    } else {
        let magnitude = (-(n + 1)) as u128;
        encode_varint_magnitude(&magnitude.to_be_bytes(), true)
    }
}

/// Encode a nonnegative big-endian `magnitude` (any width, leading zeros
/// allowed) as a minimal-length two's-complement VARINT. `negative` selects
/// `-(magnitude + 1)` instead of `magnitude` itself, so callers never need
/// to represent the negated value in a fixed-width integer type — this is
/// what lets encoding honor boundaries like `2^128` that don't fit `i128`.
pub fn encode_varint_magnitude(magnitude: &[u8], negative: bool) -> Vec<u8> {
    let mut bytes = trim_leading_zeros(magnitude.to_vec());
    if negative {
        for b in bytes.iter_mut() {
            *b = !*b;
        }
        while bytes.len() > 1 && bytes[0] == 0xFF && bytes[1] & 0x80 != 0 {
            bytes.remove(0);
        }
        if bytes.is_empty() || bytes[0] & 0x80 == 0 {
            bytes.insert(0, 0xFF);
        }
    } else {
        while bytes.len() > 1 && bytes[0] == 0 && bytes[1] & 0x80 == 0 {
            bytes.remove(0);
        }
        if bytes.is_empty() {
            bytes.push(0x00);
        } else if bytes[0] & 0x80 != 0 {
            bytes.insert(0, 0x00);
        }
    }
    bytes
}

/// Decode a minimal-length big-endian two's-complement VARINT, saturating to
/// `i128::MIN`/`i128::MAX` if the encoded magnitude is wider than 16 bytes.
/// Use [`decode_varint_magnitude`] directly when the full width matters
/// (§8 invariant 4 names `2^128` as a boundary that must round-trip without
/// panicking, which this convenience function cannot represent).
pub fn decode_varint(bytes: &[u8]) -> i128 {
    let (negative, magnitude) = decode_varint_magnitude(bytes);
    let mag = bytes_to_u128_saturating(&magnitude);
    if negative {
        // value is -(mag + 1); i128::MIN's magnitude is 2^127, so anything
        // at or past that saturates rather than wrapping through `as`.
        if mag >= i128::MIN.unsigned_abs() {
            i128::MIN
        } else {
            -(mag as i128) - 1
        }
    } else if mag > i128::MAX as u128 {
        i128::MAX
    } else {
        mag as i128
    }
}

/// Decode a minimal-length big-endian two's-complement VARINT into a sign
/// flag and an arbitrary-width nonnegative magnitude `m` such that the
/// decoded value is `m` when non-negative, or `-(m + 1)` when negative
/// (matching [`encode_varint_magnitude`]'s convention). Never overflows:
/// unlike a fixed-width accumulator, the magnitude is just the (possibly
/// bit-inverted) byte vector itself.
pub fn decode_varint_magnitude(bytes: &[u8]) -> (bool, Vec<u8>) {
    if bytes.is_empty() {
        return (false, vec![0x00]);
    }
    if bytes[0] & 0x80 != 0 {
        let not: Vec<u8> = bytes.iter().map(|b| !b).collect();
        (true, trim_leading_zeros(not))
    } else {
        (false, trim_leading_zeros(bytes.to_vec()))
    }
}

fn trim_leading_zeros(mut bytes: Vec<u8>) -> Vec<u8> {
    while bytes.len() > 1 && bytes[0] == 0 {
        bytes.remove(0);
    }
    bytes
}

/// Plain `as`-style widening never panics, so this just folds however many
/// bytes are present into a `u128`, saturating instead of truncating when
/// `magnitude` is wider than 16 bytes.
fn bytes_to_u128_saturating(magnitude: &[u8]) -> u128 {
    let trimmed = trim_leading_zeros(magnitude.to_vec());
    if trimmed.len() > 16 {
        return u128::MAX;
    }
    let mut acc: u128 = 0;
    for b in &trimmed {
        acc = (acc << 8) | (*b as u128);
    }
    acc
}

/// Decode the `bytes` payload of a column value (already stripped of the
/// outer int-length/null wrapper) according to its type.
pub fn decode(ty: &ColumnType, bytes: &[u8]) -> Result<Value, Error> {
    Ok(match ty {
        ColumnType::Ascii => Value::Ascii(String::from_utf8_lossy(bytes).into_owned()),
        ColumnType::BigInt => Value::BigInt(read_i64(bytes)?),
        ColumnType::Counter => Value::Counter(read_i64(bytes)?),
        ColumnType::Blob => Value::Blob(Bytes::copy_from_slice(bytes)),
        ColumnType::Boolean => Value::Boolean(bytes.first().copied().unwrap_or(0) != 0),
        ColumnType::Double => Value::Double(f64::from_be_bytes(read_array::<8>(bytes)?)),
        ColumnType::Float => Value::Float(f32::from_be_bytes(read_array::<4>(bytes)?)),
        ColumnType::Int => Value::Int(read_i32(bytes)?),
        ColumnType::Text | ColumnType::Varchar => {
            Value::Text(std::str::from_utf8(bytes)?.to_string())
        }
        ColumnType::Timestamp => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&read_array::<8>(bytes)?);
            Value::Timestamp(i64::from_be_bytes(buf) as u64)
        }
        ColumnType::Varint => Value::Varint(bytes.to_vec()),
        ColumnType::Decimal => {
            if bytes.len() < 4 {
                return Err(ErrorKind::ProtocolViolation("truncated decimal value".into()).into());
            }
            let scale = u32::from_be_bytes(read_array::<4>(&bytes[..4])?);
            Value::Decimal { scale, unscaled: bytes[4..].to_vec() }
        }
        ColumnType::Custom(_) | ColumnType::Uuid | ColumnType::TimeUuid | ColumnType::Inet => {
            Value::Raw(Bytes::copy_from_slice(bytes))
        }
        ColumnType::List(_) | ColumnType::Map(_, _) | ColumnType::Set(_) => {
            Value::Raw(Bytes::copy_from_slice(bytes))
        }
        ColumnType::Unknown(id) => {
            crate::common::warning!("decoding unknown column type id {id:#06x} as raw hex");
            Value::Unknown(hex(bytes))
        }
    })
}

fn read_i32(bytes: &[u8]) -> Result<i32, Error> {
    Ok(i32::from_be_bytes(read_array::<4>(bytes)?))
}

fn read_i64(bytes: &[u8]) -> Result<i64, Error> {
    Ok(i64::from_be_bytes(read_array::<8>(bytes)?))
}

fn read_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], Error> {
    bytes.try_into().map_err(|_| {
        ErrorKind::ProtocolViolation(format!("expected {N} bytes, got {}", bytes.len())).into()
    })
}

/// Render bytes as lowercase hex, used as the decode fallback for unknown types.
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn varint_canonical_boundaries() {
        let cases: &[i128] = &[-1, 0, 1, 127, 128, -128, -129, 1i128 << 63, -(1i128 << 63) - 1, i128::MAX, i128::MIN];
        for &n in cases {
            let encoded = encode_varint(n);
            assert_eq!(decode_varint(&encoded), n, "round trip failed for {n}");
            // minimality: removing the leading byte (when >1 byte) must change the sign bit
            if encoded.len() > 1 {
                let b0 = encoded[0];
                let b1 = encoded[1];
                let would_disambiguate = (b0 == 0x00 && b1 & 0x80 != 0) || (b0 == 0xFF && b1 & 0x80 == 0);
                assert!(would_disambiguate, "varint for {n} is not minimal: {encoded:02x?}");
            }
        }
    }

    #[test]
    fn varint_zero_is_single_zero_byte() {
        assert_eq!(encode_varint(0), vec![0x00]);
    }

    #[test]
    fn varint_magnitude_round_trips_2_pow_128() {
        // 2^128 doesn't fit in i128, so this exercises the byte-vector path
        // directly rather than going through `encode_varint`/`decode_varint`
        // (§8 invariant 4 names 2^128 as a required round-trip boundary).
        let mut magnitude = vec![0u8; 17];
        magnitude[0] = 0x01; // 0x01 followed by sixteen 0x00 bytes == 2^128
        let encoded = encode_varint_magnitude(&magnitude, false);
        assert_eq!(encoded, magnitude, "2^128 is already minimal: no extra 0x00 prefix needed");
        assert_eq!(decode_varint_magnitude(&encoded), (false, magnitude.clone()));

        // the negative counterpart, -(2^128 + 1), round-trips the same way.
        let encoded_neg = encode_varint_magnitude(&magnitude, true);
        assert_eq!(decode_varint_magnitude(&encoded_neg), (true, magnitude));
    }

    #[test]
    fn decode_varint_saturates_instead_of_panicking_past_i128() {
        let mut magnitude = vec![0u8; 17];
        magnitude[0] = 0x01;
        let encoded = encode_varint_magnitude(&magnitude, false);
        assert_eq!(decode_varint(&encoded), i128::MAX);

        let encoded_neg = encode_varint_magnitude(&magnitude, true);
        assert_eq!(decode_varint(&encoded_neg), i128::MIN);
    }

    #[test]
    fn varint_column_binds_from_int_or_preencoded_bytes() {
        let encoded = encode(&ColumnType::Varint, &Value::BigInt(-12345)).unwrap().unwrap();
        assert_eq!(decode_varint(&encoded), -12345);
        assert_eq!(decode(&ColumnType::Varint, &encoded).unwrap(), Value::Varint(encoded.clone()));

        let passthrough = encode(&ColumnType::Varint, &Value::Varint(encoded.clone())).unwrap().unwrap();
        assert_eq!(passthrough, encoded);
    }

    #[test]
    fn ascii_rejects_high_bytes() {
        let err = encode(&ColumnType::Ascii, &Value::Ascii("café".into()));
        assert!(err.is_err());
    }

    #[test]
    fn boolean_any_nonzero_is_true() {
        assert_eq!(decode(&ColumnType::Boolean, &[7]).unwrap(), Value::Boolean(true));
        assert_eq!(decode(&ColumnType::Boolean, &[0]).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn int_round_trip() {
        let encoded = encode(&ColumnType::Int, &Value::Int(100)).unwrap().unwrap();
        assert_eq!(encoded, vec![0x00, 0x00, 0x00, 0x64]);
        assert_eq!(decode(&ColumnType::Int, &encoded).unwrap(), Value::Int(100));
    }

    #[test]
    fn decimal_composes_scale_and_varint() {
        let scale = 2u32;
        let unscaled = encode_varint(-12345);
        let mut wire = scale.to_be_bytes().to_vec();
        wire.extend_from_slice(&unscaled);
        match decode(&ColumnType::Decimal, &wire).unwrap() {
            Value::Decimal { scale: s, unscaled: u } => {
                assert_eq!(s, 2);
                assert_eq!(decode_varint(&u), -12345);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_type_id_falls_back_to_hex() {
        let v = decode(&ColumnType::Unknown(0xBEEF), &[0xDE, 0xAD]).unwrap();
        assert_eq!(v, Value::Unknown("dead".to_string()));
    }
}

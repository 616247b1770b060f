//! Frame buffer: append/consume typed primitives to/from a byte buffer in
//! big-endian, plus the 8-byte message header.
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

use crate::{
    common::unit_error,
    error::{Error, ErrorKind},
};

/// A mutable byte sequence used on both the build side (`pack_*` appends)
/// and the parse side (`unpack_*` consumes from the front).
///
/// `BytesMut` already implements both [`Buf`] (front-consuming read) and
/// [`BufMut`] (back-appending write), so one type covers both use modes.
#[derive(Default, Clone)]
pub struct Frame {
    buf: BytesMut,
}

unit_error! {
    /// Raised when an `unpack_*` call needs more bytes than remain in the frame.
    #[derive(Clone, Copy)]
    pub struct Underflow("frame buffer underflow");
}

impl From<Underflow> for Error {
    fn from(_: Underflow) -> Self {
        ErrorKind::ProtocolViolation("truncated frame".into()).into()
    }
}

type Res<T> = Result<T, Underflow>;

impl Frame {
    /// An empty buffer for building an outgoing message.
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    /// Wrap existing bytes for parsing.
    pub fn from_bytes(bytes: impl Into<BytesMut>) -> Self {
        Self { buf: bytes.into() }
    }

    /// Wrap an owned, immutable [`Bytes`] for parsing.
    pub fn from_shared(bytes: Bytes) -> Self {
        Self { buf: BytesMut::from(&bytes[..]) }
    }

    /// Bytes remaining to be unpacked.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Consume and return all remaining bytes.
    pub fn into_rest(self) -> Bytes {
        self.buf.freeze()
    }

    fn require(&self, n: usize) -> Res<()> {
        if self.buf.remaining() < n { Err(Underflow) } else { Ok(()) }
    }

    // ---- pack (append) ----

    pub fn pack_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn pack_short(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    pub fn pack_int(&mut self, v: i32) {
        self.buf.put_i32(v);
    }

    pub fn pack_long(&mut self, v: i64) {
        self.buf.put_i64(v);
    }

    /// `string` = short length + bytes. Input is UTF-8-agnostic: callers may
    /// pass already-encoded bytes (the policy used by the VARCHAR codec).
    pub fn pack_string(&mut self, s: impl AsRef<[u8]>) {
        let s = s.as_ref();
        assert!(s.len() <= u16::MAX as usize, "string too long for short-prefixed wire type");
        self.pack_short(s.len() as u16);
        self.buf.put_slice(s);
    }

    /// `long string` = int length + bytes.
    pub fn pack_lstring(&mut self, s: impl AsRef<[u8]>) {
        let s = s.as_ref();
        assert!(s.len() <= i32::MAX as usize, "string too long for int-prefixed wire type");
        self.pack_int(s.len() as i32);
        self.buf.put_slice(s);
    }

    /// `bytes` = int length + bytes; `None` writes length -1.
    pub fn pack_bytes(&mut self, bytes: Option<&[u8]>) {
        match bytes {
            None => self.pack_int(-1),
            Some(b) => {
                assert!(b.len() <= i32::MAX as usize, "value too long for the bytes wire type");
                self.pack_int(b.len() as i32);
                self.buf.put_slice(b);
            }
        }
    }

    /// `short bytes` = short length + bytes (never null).
    pub fn pack_short_bytes(&mut self, bytes: impl AsRef<[u8]>) {
        let b = bytes.as_ref();
        assert!(b.len() <= u16::MAX as usize, "value too long for the short bytes wire type");
        self.pack_short(b.len() as u16);
        self.buf.put_slice(b);
    }

    /// `string list` = short count + strings.
    pub fn pack_string_list<S: AsRef<[u8]>>(&mut self, list: &[S]) {
        self.pack_short(list.len() as u16);
        for s in list {
            self.pack_string(s);
        }
    }

    /// `string map` = short count + {string,string} pairs, emitted key-sorted
    /// for stable output.
    pub fn pack_string_map(&mut self, map: &BTreeMap<String, String>) {
        self.pack_short(map.len() as u16);
        for (k, v) in map {
            self.pack_string(k);
            self.pack_string(v);
        }
    }

    /// `inet` = u8 addr-length + addr bytes + int port.
    pub fn pack_inet(&mut self, addr: std::net::IpAddr, port: i32) {
        match addr {
            std::net::IpAddr::V4(v4) => {
                self.pack_u8(4);
                self.buf.put_slice(&v4.octets());
            }
            std::net::IpAddr::V6(v6) => {
                self.pack_u8(16);
                self.buf.put_slice(&v6.octets());
            }
        }
        self.pack_int(port);
    }

    /// Build the 8-byte header followed by the already-packed body.
    pub fn build(version: u8, flags: u8, stream_id: i8, opcode: u8, body: Frame) -> Bytes {
        let body = body.buf.freeze();
        let mut out = BytesMut::with_capacity(8 + body.len());
        out.put_u8(version);
        out.put_u8(flags);
        out.put_i8(stream_id);
        out.put_u8(opcode);
        out.put_u32(body.len() as u32);
        out.put_slice(&body);
        out.freeze()
    }

    // ---- unpack (consume from front) ----

    pub fn unpack_u8(&mut self) -> Res<u8> {
        self.require(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn unpack_short(&mut self) -> Res<u16> {
        self.require(2)?;
        Ok(self.buf.get_u16())
    }

    pub fn unpack_int(&mut self) -> Res<i32> {
        self.require(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn unpack_long(&mut self) -> Res<i64> {
        self.require(8)?;
        Ok(self.buf.get_i64())
    }

    /// `string` = short length + UTF-8 bytes.
    pub fn unpack_string(&mut self) -> Res<String> {
        let len = self.unpack_short()? as usize;
        self.require(len)?;
        let bytes = self.buf.split_to(len);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// `long string` = int length + UTF-8 bytes.
    pub fn unpack_lstring(&mut self) -> Res<String> {
        let len = self.unpack_int()?.max(0) as usize;
        self.require(len)?;
        let bytes = self.buf.split_to(len);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// `bytes` = int length + bytes; any negative length is null.
    pub fn unpack_bytes(&mut self) -> Res<Option<Bytes>> {
        let len = self.unpack_int()?;
        if len < 0 {
            return Ok(None);
        }
        let len = len as usize;
        self.require(len)?;
        Ok(Some(self.buf.split_to(len).freeze()))
    }

    /// `short bytes` = short length + bytes (never null).
    pub fn unpack_short_bytes(&mut self) -> Res<Bytes> {
        let len = self.unpack_short()? as usize;
        self.require(len)?;
        Ok(self.buf.split_to(len).freeze())
    }

    /// `string list` = short count + strings.
    pub fn unpack_string_list(&mut self) -> Res<Vec<String>> {
        let n = self.unpack_short()?;
        (0..n).map(|_| self.unpack_string()).collect()
    }

    /// `string map` = short count + {string,string} pairs.
    pub fn unpack_string_map(&mut self) -> Res<BTreeMap<String, String>> {
        let n = self.unpack_short()?;
        let mut map = BTreeMap::new();
        for _ in 0..n {
            let k = self.unpack_string()?;
            let v = self.unpack_string()?;
            map.insert(k, v);
        }
        Ok(map)
    }

    /// `string multimap` = short count + {string,string list} pairs.
    pub fn unpack_string_multimap(&mut self) -> Res<BTreeMap<String, Vec<String>>> {
        let n = self.unpack_short()?;
        let mut map = BTreeMap::new();
        for _ in 0..n {
            let k = self.unpack_string()?;
            let v = self.unpack_string_list()?;
            map.insert(k, v);
        }
        Ok(map)
    }

    /// `inet` = u8 addr-length + addr bytes + int port.
    pub fn unpack_inet(&mut self) -> Res<(std::net::IpAddr, i32)> {
        let len = self.unpack_u8()?;
        self.require(len as usize)?;
        let addr = match len {
            4 => {
                let mut a = [0u8; 4];
                self.buf.copy_to_slice(&mut a);
                std::net::IpAddr::V4(a.into())
            }
            16 => {
                let mut a = [0u8; 16];
                self.buf.copy_to_slice(&mut a);
                std::net::IpAddr::V6(a.into())
            }
            _ => return Err(Underflow),
        };
        let port = self.unpack_int()?;
        Ok((addr, port))
    }

    /// Parse a complete frame header + body from the front of `buffer`.
    ///
    /// Returns `None` if fewer than `8 + body_length` bytes are available
    /// yet; otherwise removes exactly that many bytes and returns the parsed
    /// header fields plus the body as a fresh [`Frame`] ready for unpacking.
    pub fn parse(buffer: &mut BytesMut) -> Option<(u8, u8, i8, u8, Frame)> {
        if buffer.len() < 8 {
            return None;
        }
        let body_len = i32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]) as usize;
        if buffer.len() < 8 + body_len {
            return None;
        }
        let mut header = buffer.split_to(8 + body_len);
        let version = header.get_u8();
        let flags = header.get_u8();
        let stream_id = header.get_i8();
        let opcode = header.get_u8();
        let _body_len = header.get_u32();
        Some((version, flags, stream_id, opcode, Frame { buf: header }))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn primitive_round_trip() {
        let mut f = Frame::new();
        f.pack_short(42);
        f.pack_int(-1234);
        f.pack_long(9_999_999_999);
        let mut f = Frame::from_bytes(f.buf);
        assert_eq!(f.unpack_short().unwrap(), 42);
        assert_eq!(f.unpack_int().unwrap(), -1234);
        assert_eq!(f.unpack_long().unwrap(), 9_999_999_999);
    }

    #[test]
    fn string_round_trip_including_empty() {
        let mut f = Frame::new();
        f.pack_string("hello");
        f.pack_string("");
        let mut f = Frame::from_bytes(f.buf);
        assert_eq!(f.unpack_string().unwrap(), "hello");
        assert_eq!(f.unpack_string().unwrap(), "");
    }

    #[test]
    fn bytes_null_round_trip() {
        let mut f = Frame::new();
        f.pack_bytes(Some(b"abc"));
        f.pack_bytes(None);
        let mut f = Frame::from_bytes(f.buf);
        assert_eq!(f.unpack_bytes().unwrap().as_deref(), Some(&b"abc"[..]));
        assert_eq!(f.unpack_bytes().unwrap(), None);
    }

    #[test]
    fn string_map_sorted_and_empty() {
        let mut map = BTreeMap::new();
        map.insert("CQL_VERSION".to_string(), "3.0.0".to_string());
        let mut f = Frame::new();
        f.pack_string_map(&map);
        let mut f = Frame::from_bytes(f.buf);
        let got = f.unpack_string_map().unwrap();
        assert_eq!(got.get("CQL_VERSION").map(String::as_str), Some("3.0.0"));

        let mut f = Frame::new();
        f.pack_string_map(&BTreeMap::new());
        assert_eq!(f.into_rest().as_ref(), &[0, 0]);
    }

    #[test]
    fn header_round_trip() {
        let mut body = Frame::new();
        body.pack_string("hi");
        let built = Frame::build(0x01, 0x00, 5, 0x07, body);

        let mut buf = BytesMut::from(&built[..]);
        let (version, flags, stream_id, opcode, mut body) = Frame::parse(&mut buf).unwrap();
        assert_eq!((version, flags, stream_id, opcode), (0x01, 0x00, 5, 0x07));
        assert_eq!(body.unpack_string().unwrap(), "hi");
        assert!(buf.is_empty());
    }

    #[test]
    fn parse_waits_for_full_body() {
        let mut body = Frame::new();
        body.pack_string("hello world");
        let built = Frame::build(0x01, 0x00, 1, 0x07, body);

        let mut partial = BytesMut::from(&built[..built.len() - 1]);
        assert!(Frame::parse(&mut partial).is_none());

        let mut full = BytesMut::from(&built[..]);
        assert!(Frame::parse(&mut full).is_some());
    }
}

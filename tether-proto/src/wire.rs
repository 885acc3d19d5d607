//! Primitive encoding shared by every message variant.
//!
//! Integers are big-endian, booleans are one byte (non-zero is `true`),
//! strings and arrays carry an `i32` length prefix. Byte blocks that may be
//! absent use the [`BlockLen`] marker: `-1` for absent, `n >= 0` for present.
//!
//! A compressed section is laid out as:
//!
//! ```text
//! [i32 len][len bytes of zlib stream][SENTINEL (4 bytes)][u32 CRC-32 of the zlib bytes]
//! ```

use std::io::{self, Read, Write};

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};

use crate::config::{IntegrityPolicy, WireConfig};

/// Fixed bytes written after every compressed section.
pub const SENTINEL: [u8; 4] = [0x7A, 0xC3, 0x5E, 0x91];

/// Encoder writing into a compressed section.
pub type SectionEncoder = Encoder<ZlibEncoder<Vec<u8>>>;

/// Decoder reading from an inflated compressed section.
pub type SectionDecoder<'a> = Decoder<&'a [u8]>;

/// Output reserved per inflate step.
const INFLATE_CHUNK: usize = 32 * 1024;

/// Binary encoding of one message payload.
///
/// Payload implementations read and write only their own fields. The control
/// byte and type code are added by [`crate::Message`].
pub trait WireCodec: Sized {
    /// Writes the payload fields in wire order.
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()>;

    /// Reads the payload fields in wire order.
    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self>;
}

/// Length marker for a byte block that may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BlockLen {
    /// No block follows.
    Absent,
    /// A block of the given length follows (possibly zero).
    Present(usize),
}

impl BlockLen {
    /// Wire value of [`BlockLen::Absent`].
    const ABSENT: i32 = -1;

    /// Marker describing `block`.
    pub fn of(block: Option<&[u8]>) -> Self {
        block.map_or(Self::Absent, |b| Self::Present(b.len()))
    }

    /// Converts the marker to its `i32` wire form.
    pub fn to_wire(self) -> io::Result<i32> {
        match self {
            Self::Absent => Ok(Self::ABSENT),
            Self::Present(len) => wire_len(len),
        }
    }

    /// Parses an `i32` wire value. Negative values other than `-1` are invalid.
    pub fn from_wire(raw: i32) -> io::Result<Self> {
        match raw {
            Self::ABSENT => Ok(Self::Absent),
            n if n >= 0 => Ok(Self::Present(n.unsigned_abs() as usize)),
            n => Err(invalid(format!("invalid block length {n}"))),
        }
    }
}

/// An optional value travels as a presence flag followed by the value.
impl<T: WireCodec> WireCodec for Option<T> {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_bool(self.is_some())?;
        match self {
            Some(v) => v.encode(e),
            None => Ok(()),
        }
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        if d.read_bool()? { T::decode(d).map(Some) } else { Ok(None) }
    }
}

/// Builds an [`io::ErrorKind::InvalidData`] error.
pub(crate) fn invalid(msg: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Fails unless every parallel array in `lens` has the same length.
pub(crate) fn check_parallel(what: &str, lens: &[usize]) -> io::Result<()> {
    match lens.split_first() {
        Some((first, rest)) if rest.iter().any(|l| l != first) => Err(invalid(format!(
            "{what}: parallel arrays differ in length {lens:?}"
        ))),
        _ => Ok(()),
    }
}

/// Converts a Rust length to an `i32` length prefix.
fn wire_len(len: usize) -> io::Result<i32> {
    i32::try_from(len).map_err(|_| invalid("length exceeds i32::MAX"))
}

/// Writes wire primitives to an underlying stream.
#[derive(Debug)]
pub struct Encoder<W> {
    /// Destination stream.
    inner: W,
    /// Connection settings (compression levels).
    config: WireConfig,
}

impl<W: Write> Encoder<W> {
    /// Wraps `inner`.
    pub const fn new(inner: W, config: WireConfig) -> Self {
        Self { inner, config }
    }

    /// Settings this encoder was built with.
    pub const fn config(&self) -> &WireConfig {
        &self.config
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Writes raw bytes with no prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    /// Writes one byte.
    pub fn write_u8(&mut self, v: u8) -> io::Result<()> {
        self.inner.write_all(&[v])
    }

    /// Writes a boolean as `0` or `1`.
    pub fn write_bool(&mut self, v: bool) -> io::Result<()> {
        self.write_u8(u8::from(v))
    }

    /// Writes a big-endian `i32`.
    pub fn write_i32(&mut self, v: i32) -> io::Result<()> {
        self.inner.write_all(&v.to_be_bytes())
    }

    /// Writes a big-endian `u32`.
    pub fn write_u32(&mut self, v: u32) -> io::Result<()> {
        self.inner.write_all(&v.to_be_bytes())
    }

    /// Writes a big-endian `i64`.
    pub fn write_i64(&mut self, v: i64) -> io::Result<()> {
        self.inner.write_all(&v.to_be_bytes())
    }

    /// Writes a big-endian IEEE 754 `f64`.
    pub fn write_f64(&mut self, v: f64) -> io::Result<()> {
        self.inner.write_all(&v.to_be_bytes())
    }

    /// Writes an `i32` length prefix.
    pub fn write_len(&mut self, len: usize) -> io::Result<()> {
        self.write_i32(wire_len(len)?)
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.write_bytes(s.as_bytes())
    }

    /// Writes a presence flag followed by the string when present.
    pub fn write_opt_str(&mut self, s: Option<&str>) -> io::Result<()> {
        self.write_bool(s.is_some())?;
        match s {
            Some(s) => self.write_str(s),
            None => Ok(()),
        }
    }

    /// Writes a length-prefixed byte block.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write_len(bytes.len())?;
        self.inner.write_all(bytes)
    }

    /// Writes a byte block that may be absent.
    pub fn write_block(&mut self, block: Option<&[u8]>) -> io::Result<()> {
        self.write_i32(BlockLen::of(block).to_wire()?)?;
        match block {
            Some(b) => self.inner.write_all(b),
            None => Ok(()),
        }
    }

    /// Writes a length-prefixed sequence, encoding each item with `f`.
    pub fn write_seq<T>(
        &mut self,
        items: &[T],
        mut f: impl FnMut(&mut Self, &T) -> io::Result<()>,
    ) -> io::Result<()> {
        self.write_len(items.len())?;
        self.write_items(items, f)
    }

    /// Writes each item with `f`, without a length prefix.
    pub fn write_items<T>(
        &mut self,
        items: &[T],
        mut f: impl FnMut(&mut Self, &T) -> io::Result<()>,
    ) -> io::Result<()> {
        items.iter().try_for_each(|item| f(self, item))
    }

    /// Writes an `i32` array.
    pub fn write_i32s(&mut self, v: &[i32]) -> io::Result<()> {
        self.write_seq(v, |e, x| e.write_i32(*x))
    }

    /// Writes an `i64` array.
    pub fn write_i64s(&mut self, v: &[i64]) -> io::Result<()> {
        self.write_seq(v, |e, x| e.write_i64(*x))
    }

    /// Writes an `f64` array.
    pub fn write_f64s(&mut self, v: &[f64]) -> io::Result<()> {
        self.write_seq(v, |e, x| e.write_f64(*x))
    }

    /// Writes a boolean array.
    pub fn write_bools(&mut self, v: &[bool]) -> io::Result<()> {
        self.write_seq(v, |e, x| e.write_bool(*x))
    }

    /// Writes a string array.
    pub fn write_strs(&mut self, v: &[String]) -> io::Result<()> {
        self.write_seq(v, |e, s| e.write_str(s))
    }

    /// Writes an array of optional byte blocks.
    pub fn write_blocks(&mut self, v: &[Option<Vec<u8>>]) -> io::Result<()> {
        self.write_seq(v, |e, b| e.write_block(b.as_deref()))
    }

    /// Encodes a nested value.
    pub fn write<T: WireCodec>(&mut self, value: &T) -> io::Result<()> {
        value.encode(self)
    }

    /// Writes a zlib-compressed section whose contents are produced by `f`,
    /// followed by the sentinel and checksum trailer.
    pub fn write_compressed(
        &mut self,
        f: impl FnOnce(&mut SectionEncoder) -> io::Result<()>,
    ) -> io::Result<()> {
        let level = Compression::new(self.config.compression_level);
        let mut section = Encoder::new(ZlibEncoder::new(Vec::new(), level), self.config);
        f(&mut section)?;
        let packed = section.into_inner().finish()?;
        self.write_bytes(&packed)?;
        self.write_raw(&SENTINEL)?;
        self.write_u32(crc32fast::hash(&packed))
    }
}

/// Reads wire primitives from an underlying stream.
#[derive(Debug)]
pub struct Decoder<R> {
    /// Source stream.
    inner: R,
    /// Connection settings (limits and integrity policy).
    config: WireConfig,
    /// Compressed sections that failed their trailer check so far.
    integrity_faults: u64,
}

impl<R: Read> Decoder<R> {
    /// Wraps `inner`.
    pub const fn new(inner: R, config: WireConfig) -> Self {
        Self {
            inner,
            config,
            integrity_faults: 0,
        }
    }

    /// Settings this decoder was built with.
    pub const fn config(&self) -> &WireConfig {
        &self.config
    }

    /// Number of integrity faults tolerated under [`IntegrityPolicy::Warn`].
    pub const fn integrity_faults(&self) -> u64 {
        self.integrity_faults
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Reads exactly `N` bytes.
    fn fill<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> io::Result<u8> {
        let [b] = self.fill()?;
        Ok(b)
    }

    /// Reads one byte, or returns `None` if the stream ended cleanly first.
    pub fn try_read_u8(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Reads a boolean.
    pub fn read_bool(&mut self) -> io::Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a big-endian `i32`.
    pub fn read_i32(&mut self) -> io::Result<i32> {
        self.fill().map(i32::from_be_bytes)
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32(&mut self) -> io::Result<u32> {
        self.fill().map(u32::from_be_bytes)
    }

    /// Reads a big-endian `i64`.
    pub fn read_i64(&mut self) -> io::Result<i64> {
        self.fill().map(i64::from_be_bytes)
    }

    /// Reads a big-endian `f64`.
    pub fn read_f64(&mut self) -> io::Result<f64> {
        self.fill().map(f64::from_be_bytes)
    }

    /// Reads an `i32` length prefix, rejecting negative or oversized values.
    pub fn read_len(&mut self) -> io::Result<usize> {
        let raw = self.read_i32()?;
        let len = usize::try_from(raw).map_err(|_| invalid(format!("negative length {raw}")))?;
        if len > self.config.max_elements {
            return Err(invalid(format!(
                "length {len} exceeds limit {}",
                self.config.max_elements
            )));
        }
        Ok(len)
    }

    /// Reads `len` raw bytes.
    fn read_raw(&mut self, len: usize) -> io::Result<Vec<u8>> {
        if len > self.config.max_block_len {
            return Err(invalid(format!(
                "block of {len} bytes exceeds limit {}",
                self.config.max_block_len
            )));
        }
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a length-prefixed byte block.
    pub fn read_bytes(&mut self) -> io::Result<Vec<u8>> {
        let raw = self.read_i32()?;
        let len = usize::try_from(raw).map_err(|_| invalid(format!("negative length {raw}")))?;
        self.read_raw(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> io::Result<String> {
        let len = self.read_len()?;
        let bytes = self.read_raw(len)?;
        String::from_utf8(bytes).map_err(invalid)
    }

    /// Reads a presence flag and, when set, a string.
    pub fn read_opt_string(&mut self) -> io::Result<Option<String>> {
        if self.read_bool()? {
            self.read_string().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Reads a byte block that may be absent. Absent blocks allocate nothing.
    pub fn read_block(&mut self) -> io::Result<Option<Vec<u8>>> {
        match BlockLen::from_wire(self.read_i32()?)? {
            BlockLen::Absent => Ok(None),
            BlockLen::Present(len) => self.read_raw(len).map(Some),
        }
    }

    /// Reads a length-prefixed sequence, decoding each item with `f`.
    pub fn read_seq<T>(
        &mut self,
        f: impl FnMut(&mut Self) -> io::Result<T>,
    ) -> io::Result<Vec<T>> {
        let len = self.read_len()?;
        self.read_items(len, f)
    }

    /// Reads `len` items whose count was sent elsewhere.
    pub fn read_items<T>(
        &mut self,
        len: usize,
        mut f: impl FnMut(&mut Self) -> io::Result<T>,
    ) -> io::Result<Vec<T>> {
        if len > self.config.max_elements {
            return Err(invalid(format!(
                "{len} items exceed limit {}",
                self.config.max_elements
            )));
        }
        // Grow as items arrive; a corrupt prefix must not reserve the limit up front.
        let mut out = Vec::with_capacity(len.min(4096));
        for _ in 0..len {
            out.push(f(self)?);
        }
        Ok(out)
    }

    /// Reads an `i32` array.
    pub fn read_i32s(&mut self) -> io::Result<Vec<i32>> {
        self.read_seq(Self::read_i32)
    }

    /// Reads an `i64` array.
    pub fn read_i64s(&mut self) -> io::Result<Vec<i64>> {
        self.read_seq(Self::read_i64)
    }

    /// Reads an `f64` array.
    pub fn read_f64s(&mut self) -> io::Result<Vec<f64>> {
        self.read_seq(Self::read_f64)
    }

    /// Reads a boolean array.
    pub fn read_bools(&mut self) -> io::Result<Vec<bool>> {
        self.read_seq(Self::read_bool)
    }

    /// Reads a string array.
    pub fn read_strings(&mut self) -> io::Result<Vec<String>> {
        self.read_seq(Self::read_string)
    }

    /// Reads an array of optional byte blocks.
    pub fn read_blocks(&mut self) -> io::Result<Vec<Option<Vec<u8>>>> {
        self.read_seq(Self::read_block)
    }

    /// Decodes a nested value.
    pub fn read<T: WireCodec>(&mut self) -> io::Result<T> {
        T::decode(self)
    }

    /// Reads a compressed section, verifies its trailer, and decodes the
    /// inflated contents with `f`.
    ///
    /// A bad trailer, a damaged zlib stream or unread inflated bytes count as
    /// an integrity fault, handled per [`WireConfig::integrity`]. Under
    /// [`IntegrityPolicy::Warn`] whatever inflated cleanly is still decoded.
    pub fn read_compressed<T>(
        &mut self,
        f: impl FnOnce(&mut SectionDecoder<'_>) -> io::Result<T>,
    ) -> io::Result<T> {
        let packed = self.read_bytes()?;
        let trailer: [u8; SENTINEL.len()] = self.fill()?;
        let checksum = self.read_u32()?;

        if trailer != SENTINEL {
            self.integrity_fault("sentinel mismatch after compressed section")?;
        } else if crc32fast::hash(&packed) != checksum {
            self.integrity_fault("checksum mismatch in compressed section")?;
        }

        let inflated = self.inflate(&packed)?;
        let mut section = Decoder::new(inflated.as_slice(), self.config);
        let value = f(&mut section).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => invalid("compressed section ends early"),
            _ => e,
        })?;
        self.integrity_faults += section.integrity_faults;
        if !section.inner.is_empty() {
            self.integrity_fault("unread bytes inside compressed section")?;
        }
        Ok(value)
    }

    /// Inflates a zlib stream into at most `max_block_len` bytes.
    ///
    /// The CRC trailer already covers the packed bytes, so the body is
    /// inflated as raw deflate and the adler32 footer is not consulted.
    fn inflate(&mut self, packed: &[u8]) -> io::Result<Vec<u8>> {
        let body = match packed {
            [cmf, flg, body @ ..] if zlib_header_ok(*cmf, *flg) => body,
            _ => {
                self.integrity_fault("malformed zlib header in compressed section")?;
                packed.get(2..).unwrap_or_default()
            }
        };

        let limit = self.config.max_block_len;
        let mut z = Decompress::new(false);
        let mut out = Vec::new();
        loop {
            let room = limit.saturating_add(1).saturating_sub(out.len());
            out.reserve(room.min(INFLATE_CHUNK));
            let consumed = usize::try_from(z.total_in()).unwrap_or(usize::MAX);
            let before = (z.total_in(), z.total_out());
            let input = body.get(consumed..).unwrap_or_default();
            let status = z.decompress_vec(input, &mut out, FlushDecompress::Finish);
            if out.len() > limit {
                return Err(invalid(format!(
                    "compressed section inflates past limit {limit}"
                )));
            }
            match status {
                Ok(Status::StreamEnd) => return Ok(out),
                Ok(_) if (z.total_in(), z.total_out()) != before => {}
                Ok(_) => {
                    self.integrity_fault("compressed section ends mid-stream")?;
                    return Ok(out);
                }
                Err(e) => {
                    self.integrity_fault(&format!("corrupt compressed section: {e}"))?;
                    return Ok(out);
                }
            }
        }
    }

    /// Records an integrity fault; fails under [`IntegrityPolicy::Strict`].
    fn integrity_fault(&mut self, what: &str) -> io::Result<()> {
        self.integrity_faults += 1;
        match self.config.integrity {
            IntegrityPolicy::Warn => {
                tracing::warn!(fault = what, "integrity check failed, decoding anyway");
                Ok(())
            }
            IntegrityPolicy::Strict => Err(invalid(format!("integrity check failed: {what}"))),
        }
    }
}

/// Whether `cmf`/`flg` form a zlib header for a deflate stream without a
/// preset dictionary.
const fn zlib_header_ok(cmf: u8, flg: u8) -> bool {
    let word = u16::from_be_bytes([cmf, flg]);
    cmf & 0x0F == 8 && word % 31 == 0 && flg & 0x20 == 0
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn decoder(bytes: &[u8], config: WireConfig) -> Decoder<Cursor<&[u8]>> {
        Decoder::new(Cursor::new(bytes), config)
    }

    fn encode_section(names: &[String]) -> Vec<u8> {
        let mut e = Encoder::new(Vec::new(), WireConfig::default());
        e.write_compressed(|s| s.write_strs(names)).unwrap();
        e.into_inner()
    }

    #[test]
    fn absent_and_empty_blocks_stay_distinct() {
        let mut e = Encoder::new(Vec::new(), WireConfig::default());
        e.write_block(None).unwrap();
        e.write_block(Some(&[])).unwrap();
        e.write_block(Some(b"cafe")).unwrap();
        let buf = e.into_inner();
        assert_eq!(&buf[..8], &[0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);

        let mut d = decoder(&buf, WireConfig::default());
        assert_eq!(d.read_block().unwrap(), None);
        assert_eq!(d.read_block().unwrap(), Some(Vec::new()));
        assert_eq!(d.read_block().unwrap().as_deref(), Some(&b"cafe"[..]));
    }

    #[test]
    fn rejects_negative_array_length() {
        let buf = (-2i32).to_be_bytes();
        let err = decoder(&buf, WireConfig::default()).read_i32s().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let err = decoder(&buf, WireConfig::default()).read_block().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn rejects_length_over_limit() {
        let config = WireConfig {
            max_elements: 4,
            ..WireConfig::default()
        };
        let mut e = Encoder::new(Vec::new(), config);
        e.write_i64s(&[1, 2, 3, 4, 5]).unwrap();
        let buf = e.into_inner();
        let err = decoder(&buf, config).read_i64s().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn rejects_invalid_utf8() {
        let mut buf = 2i32.to_be_bytes().to_vec();
        buf.extend_from_slice(&[0xC3, 0x28]);
        let err = decoder(&buf, WireConfig::default()).read_string().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn clean_end_of_stream_is_not_an_error() {
        let mut d = decoder(&[5], WireConfig::default());
        assert_eq!(d.try_read_u8().unwrap(), Some(5));
        assert_eq!(d.try_read_u8().unwrap(), None);
    }

    #[test]
    fn truncated_stream_is_eof() {
        let buf = [0, 0, 0, 3, 1, 2];
        let err = decoder(&buf, WireConfig::default()).read_bytes().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn scalars_are_big_endian() {
        let mut e = Encoder::new(Vec::new(), WireConfig::default());
        e.write_i32(0x0102_0304).unwrap();
        e.write_f64(1.5).unwrap();
        e.write_bool(true).unwrap();
        let buf = e.into_inner();
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
        assert_eq!(&buf[4..12], &1.5f64.to_be_bytes());

        let mut d = decoder(&buf, WireConfig::default());
        assert_eq!(d.read_i32().unwrap(), 0x0102_0304);
        assert!((d.read_f64().unwrap() - 1.5).abs() < f64::EPSILON);
        assert!(d.read_bool().unwrap());
    }

    #[test]
    fn compressed_section_is_self_delimiting() {
        let names: Vec<String> = (0..100).map(|i| format!("com.example.Class{i}")).collect();
        let mut buf = encode_section(&names);
        buf.extend_from_slice(&7i32.to_be_bytes());

        let mut d = decoder(&buf, WireConfig::default());
        let decoded = d.read_compressed(|s| s.read_strings()).unwrap();
        assert_eq!(decoded, names);
        assert_eq!(d.read_i32().unwrap(), 7);
        assert_eq!(d.integrity_faults(), 0);
    }

    #[test]
    fn corruption_inside_section_is_always_flagged() {
        let names: Vec<String> = (0..20).map(|i| format!("pkg.Type{i}")).collect();
        let clean = encode_section(&names);
        let packed_len = clean.len() - 4 - SENTINEL.len() - 4;

        for pos in 4..4 + packed_len {
            let mut corrupt = clean.clone();
            corrupt[pos] ^= 0x5A;
            let mut d = decoder(&corrupt, WireConfig::default());
            // Inflate may or may not fail; the trailer check must fire regardless.
            let _ = d.read_compressed(|s| s.read_strings());
            assert!(d.integrity_faults() >= 1, "corruption at byte {pos} went unnoticed");
        }
    }

    #[test]
    fn sentinel_mismatch_warns_then_decodes() {
        let names = vec!["a.B".to_owned()];
        let mut buf = encode_section(&names);
        let sentinel_at = buf.len() - 4 - SENTINEL.len();
        buf[sentinel_at] = 0;

        let mut d = decoder(&buf, WireConfig::default());
        assert_eq!(d.read_compressed(|s| s.read_strings()).unwrap(), names);
        assert_eq!(d.integrity_faults(), 1);
    }

    #[test]
    fn strict_policy_escalates() {
        let names = vec!["a.B".to_owned()];
        let mut buf = encode_section(&names);
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;

        let config = WireConfig::default().with_integrity(IntegrityPolicy::Strict);
        let err = decoder(&buf, config)
            .read_compressed(|s| s.read_strings())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn damaged_zlib_footer_still_decodes_under_warn() {
        let names: Vec<String> = (0..20).map(|i| format!("pkg.Type{i}")).collect();
        let mut buf = encode_section(&names);
        // Last packed byte belongs to the adler32 footer.
        let footer_at = buf.len() - 4 - SENTINEL.len() - 1;
        buf[footer_at] ^= 0xFF;

        let mut d = decoder(&buf, WireConfig::default());
        assert_eq!(d.read_compressed(|s| s.read_strings()).unwrap(), names);
        assert_eq!(d.integrity_faults(), 1);

        let config = WireConfig::default().with_integrity(IntegrityPolicy::Strict);
        let err = decoder(&buf, config)
            .read_compressed(|s| s.read_strings())
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn broken_deflate_body_is_invalid_data() {
        // Valid zlib header followed by a block with the reserved type.
        let packed = [0x78, 0x9C, 0x07];
        let mut buf = Vec::new();
        buf.extend_from_slice(&3i32.to_be_bytes());
        buf.extend_from_slice(&packed);
        buf.extend_from_slice(&SENTINEL);
        buf.extend_from_slice(&crc32fast::hash(&packed).to_be_bytes());

        let mut d = decoder(&buf, WireConfig::default());
        let err = d.read_compressed(|s| s.read_strings()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(d.integrity_faults(), 1);
    }

    #[test]
    fn leftover_section_bytes_are_a_fault() {
        let names = vec!["x".to_owned(), "y".to_owned()];
        let buf = encode_section(&names);
        let mut d = decoder(&buf, WireConfig::default());
        // Read only the length prefix and first string, leaving the second unread.
        d.read_compressed(|s| {
            let _ = s.read_len()?;
            s.read_string()
        })
        .unwrap();
        assert_eq!(d.integrity_faults(), 1);
    }

    #[test]
    fn parallel_check() {
        assert!(check_parallel("t", &[3, 3, 3]).is_ok());
        assert!(check_parallel("t", &[]).is_ok());
        assert!(check_parallel("t", &[3, 2]).is_err());
    }
}

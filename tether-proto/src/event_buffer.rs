//! Dumped instrumentation event buffers.
//!
//! Small buffers travel inline, deflate-compressed at a fast level because
//! they are produced continuously. Large buffers are written to a file both
//! processes can reach and only the file name travels.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde::{Deserialize, Serialize};

use crate::config::WireConfig;
use crate::wire::{Decoder, Encoder, WireCodec, invalid};

/// Monotonic counter for unique spill file names.
static SPILL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Agent → controller: the event buffer filled up or was flushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum EventBufferDumped {
    /// The buffer contents, sent in-band.
    Inline(Vec<u8>),
    /// The first `size` bytes of the named shared file.
    SharedFile {
        /// Path of the shared file, as seen by the receiver.
        name: String,
        /// Number of valid bytes at the start of the file.
        size: usize,
    },
}

impl EventBufferDumped {
    /// Copies `len` bytes at `start` out of a larger buffer.
    pub fn from_range(buffer: &[u8], start: usize, len: usize) -> io::Result<Self> {
        start
            .checked_add(len)
            .and_then(|end| buffer.get(start..end))
            .map(|bytes| Self::Inline(bytes.to_vec()))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("range {start}+{len} outside buffer of {}", buffer.len()),
                )
            })
    }

    /// Sends `bytes` inline when at most
    /// [`WireConfig::inline_event_buffer_limit`] long, otherwise writes them to
    /// a new file under `dir` and sends its name.
    ///
    /// The file only appears under its final name once fully written.
    pub fn spill(bytes: Vec<u8>, dir: &Path, config: &WireConfig) -> io::Result<Self> {
        if bytes.len() <= config.inline_event_buffer_limit {
            return Ok(Self::Inline(bytes));
        }
        let seq = SPILL_SEQ.fetch_add(1, Ordering::Relaxed);
        let stem = format!("tether-events-{}-{seq}", std::process::id());
        let path = dir.join(format!("{stem}.buf"));
        let tmp = dir.join(format!("{stem}.buf.tmp"));
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "event buffer spilled to file");
        Ok(Self::SharedFile {
            name: path.to_string_lossy().into_owned(),
            size: bytes.len(),
        })
    }

    /// Number of event bytes carried.
    pub fn size(&self) -> usize {
        match self {
            Self::Inline(bytes) => bytes.len(),
            Self::SharedFile { size, .. } => *size,
        }
    }

    /// Takes the event bytes, reading the shared file if necessary.
    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        match self {
            Self::Inline(bytes) => Ok(bytes),
            Self::SharedFile { name, size } => {
                let mut buf = Vec::with_capacity(size.min(1 << 20));
                fs::File::open(&name)?
                    .take(size as u64)
                    .read_to_end(&mut buf)?;
                if buf.len() == size {
                    Ok(buf)
                } else {
                    Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("{name} holds {} bytes, expected {size}", buf.len()),
                    ))
                }
            }
        }
    }
}

impl WireCodec for EventBufferDumped {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_len(self.size())?;
        match self {
            Self::Inline(bytes) => {
                e.write_bool(true)?;
                let level = Compression::new(e.config().event_compression_level);
                let mut z = DeflateEncoder::new(Vec::new(), level);
                z.write_all(bytes)?;
                e.write_bytes(&z.finish()?)
            }
            Self::SharedFile { name, .. } => {
                e.write_bool(false)?;
                e.write_str(name)
            }
        }
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        let raw = d.read_i32()?;
        let size = usize::try_from(raw)
            .ok()
            .filter(|s| *s <= d.config().max_block_len)
            .ok_or_else(|| invalid(format!("invalid event buffer size {raw}")))?;

        if !d.read_bool()? {
            let name = d.read_string()?;
            return Ok(Self::SharedFile { name, size });
        }

        let packed = d.read_bytes()?;
        let mut bytes = Vec::with_capacity(size.min(1 << 20));
        DeflateDecoder::new(packed.as_slice())
            .take(size as u64 + 1)
            .read_to_end(&mut bytes)?;
        if bytes.len() != size {
            return Err(invalid(format!(
                "event buffer inflated to {} bytes, expected {size}",
                bytes.len()
            )));
        }
        Ok(Self::Inline(bytes))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn round_trip(msg: &EventBufferDumped) -> io::Result<EventBufferDumped> {
        let mut e = Encoder::new(Vec::new(), WireConfig::default());
        msg.encode(&mut e)?;
        let buf = e.into_inner();
        EventBufferDumped::decode(&mut Decoder::new(Cursor::new(buf), WireConfig::default()))
    }

    fn events(n: usize) -> Vec<u8> {
        (0..n).map(|i| u8::try_from(i % 7).unwrap()).collect()
    }

    #[test]
    fn inline_round_trip() {
        let msg = EventBufferDumped::Inline(events(10_000));
        assert_eq!(round_trip(&msg).unwrap(), msg);

        let empty = EventBufferDumped::Inline(Vec::new());
        assert_eq!(round_trip(&empty).unwrap(), empty);
    }

    #[test]
    fn shared_file_round_trip() {
        let msg = EventBufferDumped::SharedFile {
            name: "/tmp/events.buf".into(),
            size: 4096,
        };
        assert_eq!(round_trip(&msg).unwrap(), msg);
    }

    #[test]
    fn range_copies_offset_window() {
        let buf = events(64);
        let msg = EventBufferDumped::from_range(&buf, 10, 20).unwrap();
        assert_eq!(msg, EventBufferDumped::Inline(buf[10..30].to_vec()));
        assert!(EventBufferDumped::from_range(&buf, 60, 10).is_err());
        assert!(EventBufferDumped::from_range(&buf, usize::MAX, 2).is_err());
    }

    #[test]
    fn spill_respects_limit() {
        let dir = tempfile::tempdir().unwrap();

        let config = WireConfig::default().with_inline_event_buffer_limit(100);

        let small = EventBufferDumped::spill(events(100), dir.path(), &config).unwrap();
        assert!(matches!(small, EventBufferDumped::Inline(_)));

        let bytes = events(101);
        let big = EventBufferDumped::spill(bytes.clone(), dir.path(), &config).unwrap();
        assert!(matches!(big, EventBufferDumped::SharedFile { size: 101, .. }));

        let decoded = round_trip(&big).unwrap();
        assert_eq!(decoded.into_bytes().unwrap(), bytes);

        let inline = EventBufferDumped::spill(events(101), dir.path(), &WireConfig::default());
        assert!(matches!(inline.unwrap(), EventBufferDumped::Inline(_)));
    }

    #[test]
    fn spill_leaves_only_finished_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = WireConfig::default().with_inline_event_buffer_limit(0);
        let first = EventBufferDumped::spill(events(300), dir.path(), &config).unwrap();
        let second = EventBufferDumped::spill(events(500), dir.path(), &config).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.ends_with(".buf")), "{names:?}");

        assert_eq!(first.into_bytes().unwrap(), events(300));
        assert_eq!(second.into_bytes().unwrap(), events(500));
    }

    #[test]
    fn short_shared_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.buf");
        fs::write(&path, b"abc").unwrap();
        let msg = EventBufferDumped::SharedFile {
            name: path.to_string_lossy().into_owned(),
            size: 10,
        };
        assert_eq!(msg.into_bytes().unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mut e = Encoder::new(Vec::new(), WireConfig::default());
        EventBufferDumped::Inline(events(50)).encode(&mut e).unwrap();
        let mut buf = e.into_inner();
        buf[..4].copy_from_slice(&40i32.to_be_bytes());

        let err = EventBufferDumped::decode(&mut Decoder::new(Cursor::new(buf), WireConfig::default()))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}

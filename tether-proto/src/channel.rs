//! Message framing over a duplex byte stream.
//!
//! Every message starts with a control byte naming its family and shape:
//!
//! | byte | shape                                                     |
//! |------|-----------------------------------------------------------|
//! | 1    | signal: `code`                                            |
//! | 2    | directive: `code payload`                                 |
//! | 3    | simple reply: `ok has_error [error]`                      |
//! | 4    | reply: `code ok has_error [error] payload`                |
//!
//! There is no resynchronisation: a malformed frame leaves the stream at an
//! unknown position, so every decode error is fatal for the connection.

use std::io::{self, BufReader, Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WireConfig;
use crate::directive::Directive;
use crate::kind::{DirectiveKind, ReplyKind, Signal};
use crate::reply::{Reply, ReplyBody};
use crate::wire::{Decoder, Encoder, WireCodec, invalid};

/// Control byte of a payload-less directive.
pub const SIMPLE_DIRECTIVE: u8 = 1;
/// Control byte of a directive with payload.
pub const COMPLEX_DIRECTIVE: u8 = 2;
/// Control byte of a payload-less reply.
pub const SIMPLE_REPLY: u8 = 3;
/// Control byte of a reply with payload.
pub const COMPLEX_REPLY: u8 = 4;

/// Either message family, as read off the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Message {
    /// A request or notification.
    Directive(Directive),
    /// A response.
    Reply(Reply),
}

impl Message {
    /// Variant name, as shown in logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Directive(d) => d.name(),
            Self::Reply(r) => r.name(),
        }
    }

    /// Decodes the rest of a message whose control byte was already read.
    pub fn decode_after<R: Read>(control: u8, d: &mut Decoder<R>) -> io::Result<Self> {
        match control {
            SIMPLE_DIRECTIVE => {
                let code = d.read_u8()?;
                match Signal::from_code(code) {
                    Some(signal) => Ok(Self::Directive(Directive::Signal(signal))),
                    None => Err(unknown_code(control, code)),
                }
            }
            COMPLEX_DIRECTIVE => {
                let code = d.read_u8()?;
                let kind = DirectiveKind::from_code(code).ok_or_else(|| unknown_code(control, code))?;
                Directive::decode_payload(kind, d).map(Self::Directive)
            }
            SIMPLE_REPLY => {
                let (ok, error) = read_outcome(d)?;
                Ok(Self::Reply(Reply {
                    ok,
                    error,
                    body: ReplyBody::Ack,
                }))
            }
            COMPLEX_REPLY => {
                let code = d.read_u8()?;
                let kind = ReplyKind::from_code(code).ok_or_else(|| unknown_code(control, code))?;
                let (ok, error) = read_outcome(d)?;
                let body = ReplyBody::decode_payload(kind, d)?;
                Ok(Self::Reply(Reply { ok, error, body }))
            }
            other => Err(invalid(format!("invalid control byte {other}"))),
        }
    }
}

impl From<Directive> for Message {
    fn from(d: Directive) -> Self {
        Self::Directive(d)
    }
}

impl From<Reply> for Message {
    fn from(r: Reply) -> Self {
        Self::Reply(r)
    }
}

impl WireCodec for Message {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        match self {
            Self::Directive(d) => write_directive(d, e),
            Self::Reply(r) => write_reply(r, e),
        }
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        let control = d.read_u8()?;
        Self::decode_after(control, d)
    }
}

/// Error for a type code missing from the table its control byte selects.
fn unknown_code(control: u8, code: u8) -> io::Error {
    invalid(format!("unknown type code {code} for control byte {control}"))
}

/// Writes a framed directive.
fn write_directive<W: Write>(d: &Directive, e: &mut Encoder<W>) -> io::Result<()> {
    match d {
        Directive::Signal(signal) => {
            e.write_u8(SIMPLE_DIRECTIVE)?;
            e.write_u8(signal.code())
        }
        _ => {
            e.write_u8(COMPLEX_DIRECTIVE)?;
            e.write_u8(d.code())?;
            d.encode_payload(e)
        }
    }
}

/// Writes a framed reply.
fn write_reply<W: Write>(r: &Reply, e: &mut Encoder<W>) -> io::Result<()> {
    match r.kind() {
        None => e.write_u8(SIMPLE_REPLY)?,
        Some(kind) => {
            e.write_u8(COMPLEX_REPLY)?;
            e.write_u8(kind.code())?;
        }
    }
    e.write_bool(r.ok)?;
    e.write_opt_str(r.error.as_deref())?;
    r.body.encode_payload(e)
}

/// Reads the outcome flag and optional error text of a reply.
fn read_outcome<R: Read>(d: &mut Decoder<R>) -> io::Result<(bool, Option<String>)> {
    let ok = d.read_bool()?;
    let error = d.read_opt_string()?;
    Ok((ok, error))
}

/// Receiving half of a connection. Only one thread reads at a time.
#[derive(Debug)]
pub struct WireReader<R> {
    /// Stream decoder; also tracks integrity faults.
    decoder: Decoder<R>,
}

impl<R: Read> WireReader<R> {
    /// Wraps `inner`.
    pub const fn new(inner: R, config: WireConfig) -> Self {
        Self {
            decoder: Decoder::new(inner, config),
        }
    }

    /// Reads the next message.
    ///
    /// End of stream, even between messages, is [`io::ErrorKind::UnexpectedEof`].
    pub fn recv(&mut self) -> io::Result<Message> {
        self.try_recv()?
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"))
    }

    /// Reads the next message, or returns `None` if the peer closed the
    /// stream at a message boundary.
    pub fn try_recv(&mut self) -> io::Result<Option<Message>> {
        let Some(control) = self.decoder.try_read_u8()? else {
            return Ok(None);
        };
        let msg = Message::decode_after(control, &mut self.decoder)?;
        debug!(message = msg.name(), "received");
        Ok(Some(msg))
    }

    /// Reads the next message, which must be a directive.
    pub fn recv_directive(&mut self) -> io::Result<Directive> {
        match self.recv()? {
            Message::Directive(d) => Ok(d),
            Message::Reply(r) => Err(invalid(format!("expected a directive, got reply {}", r.name()))),
        }
    }

    /// Reads the next message, which must be a reply.
    pub fn recv_reply(&mut self) -> io::Result<Reply> {
        match self.recv()? {
            Message::Reply(r) => Ok(r),
            Message::Directive(d) => {
                Err(invalid(format!("expected a reply, got directive {}", d.name())))
            }
        }
    }

    /// Compressed sections that failed their integrity check so far.
    pub const fn integrity_faults(&self) -> u64 {
        self.decoder.integrity_faults()
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> R {
        self.decoder.into_inner()
    }
}

/// Sending half of a connection, shareable between threads.
///
/// Each message is encoded in full before the stream lock is taken, so
/// concurrent senders never interleave bytes and a failed encode writes
/// nothing.
#[derive(Debug)]
pub struct WireWriter<W> {
    /// Destination stream.
    inner: Mutex<W>,
    /// Settings for the per-message encoder.
    config: WireConfig,
}

impl<W: Write> WireWriter<W> {
    /// Wraps `inner`.
    pub const fn new(inner: W, config: WireConfig) -> Self {
        Self {
            inner: Mutex::new(inner),
            config,
        }
    }

    /// Writes and flushes one message.
    pub fn send(&self, msg: &Message) -> io::Result<()> {
        let mut e = Encoder::new(Vec::new(), self.config);
        msg.encode(&mut e)?;
        self.write_frame(msg.name(), &e.into_inner())
    }

    /// Writes and flushes one directive.
    pub fn send_directive(&self, d: &Directive) -> io::Result<()> {
        let mut e = Encoder::new(Vec::new(), self.config);
        write_directive(d, &mut e)?;
        self.write_frame(d.name(), &e.into_inner())
    }

    /// Writes and flushes one reply.
    pub fn send_reply(&self, r: &Reply) -> io::Result<()> {
        let mut e = Encoder::new(Vec::new(), self.config);
        write_reply(r, &mut e)?;
        self.write_frame(r.name(), &e.into_inner())
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> io::Result<W> {
        self.inner
            .into_inner()
            .map_err(|_| io::Error::other("writer lock poisoned"))
    }

    /// Writes an encoded frame under the stream lock.
    fn write_frame(&self, name: &str, frame: &[u8]) -> io::Result<()> {
        let mut w = self
            .inner
            .lock()
            .map_err(|_| io::Error::other("writer lock poisoned"))?;
        w.write_all(frame)?;
        w.flush()?;
        debug!(message = name, bytes = frame.len(), "sent");
        Ok(())
    }
}

/// Both halves of one connection.
#[derive(Debug)]
pub struct Channel<R, W> {
    /// Receiving half.
    reader: WireReader<R>,
    /// Sending half.
    writer: Arc<WireWriter<W>>,
}

impl<R: Read, W: Write> Channel<R, W> {
    /// Builds a channel from separate read and write handles of one stream.
    pub fn new(reader: R, writer: W, config: WireConfig) -> Self {
        Self {
            reader: WireReader::new(reader, config),
            writer: Arc::new(WireWriter::new(writer, config)),
        }
    }

    /// The receiving half.
    pub const fn reader(&mut self) -> &mut WireReader<R> {
        &mut self.reader
    }

    /// The sending half.
    pub const fn writer(&self) -> &Arc<WireWriter<W>> {
        &self.writer
    }

    /// Splits into the receiving half and a shareable sending half.
    pub fn split(self) -> (WireReader<R>, Arc<WireWriter<W>>) {
        (self.reader, self.writer)
    }
}

impl Channel<BufReader<TcpStream>, TcpStream> {
    /// Wraps a connected TCP stream.
    pub fn over_tcp(stream: TcpStream, config: WireConfig) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self::new(reader, stream, config))
    }
}

#[cfg(unix)]
impl Channel<BufReader<UnixStream>, UnixStream> {
    /// Wraps a connected Unix domain socket.
    pub fn over_unix(stream: UnixStream, config: WireConfig) -> io::Result<Self> {
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self::new(reader, stream, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::thread;

    use super::*;
    use crate::{
        AsyncMessage, ClassLoaded, EventBufferDumped, GeneralNumbers, HeapHistogram,
        InitiateProfiling, InstrType, MethodNames, MonitoredNumbers, RootClassLoaded,
        TakeHeapDump, ThreadDump, ThreadsData,
    };

    fn frame(msgs: &[Message]) -> Vec<u8> {
        let writer = WireWriter::new(Vec::new(), WireConfig::default());
        for msg in msgs {
            writer.send(msg).unwrap();
        }
        writer.into_inner().unwrap()
    }

    fn reader(bytes: Vec<u8>) -> WireReader<Cursor<Vec<u8>>> {
        WireReader::new(Cursor::new(bytes), WireConfig::default())
    }

    fn sequence() -> Vec<Message> {
        vec![
            Directive::Signal(Signal::CheckConnection).into(),
            Reply::ack().into(),
            Directive::InitiateProfiling(InitiateProfiling::new(
                InstrType::RecursiveFull,
                vec!["Main".into()],
            ))
            .into(),
            Directive::ClassLoaded(ClassLoaded {
                class_name: "Main".into(),
                loader_chain: vec![0],
                class_file_bytes: None,
                in_call_graph: true,
            })
            .into(),
            Directive::RootClassLoaded(RootClassLoaded {
                class_names: vec!["Main".into()],
                loader_ids: vec![0],
                cached_class_bytes: vec![Some(vec![0xCA, 0xFE])],
                parent_loader_ids: vec![-1],
            })
            .into(),
            Directive::EventBufferDumped(EventBufferDumped::Inline(vec![1; 300])).into(),
            Reply::with_body(ReplyBody::MonitoredNumbers(MonitoredNumbers {
                general: GeneralNumbers {
                    free_memory: 1,
                    total_memory: 2,
                    ..GeneralNumbers::default()
                },
                threads: ThreadsData::Sampled {
                    thread_ids: vec![1],
                    timestamps: vec![5, 6],
                    states: vec![crate::ThreadState::Running, crate::ThreadState::Wait],
                },
                ..MonitoredNumbers::default()
            }))
            .into(),
            Reply::with_body(ReplyBody::MethodNames(MethodNames::pack(&["foo", "bar"]).unwrap()))
                .into(),
            Reply::with_body(ReplyBody::HeapHistogram(HeapHistogram::default())).into(),
            Reply::with_body(ReplyBody::ThreadDump(ThreadDump::default())).into(),
            Reply::failed("target disconnected").into(),
            Directive::AsyncMessage(AsyncMessage::new(true, "done")).into(),
        ]
    }

    #[test]
    fn sequence_decodes_in_order() {
        let msgs = sequence();
        let mut r = reader(frame(&msgs));
        for expected in &msgs {
            assert_eq!(&r.recv().unwrap(), expected);
        }
        assert!(r.try_recv().unwrap().is_none());
        assert_eq!(r.recv().unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(r.integrity_faults(), 0);
    }

    #[test]
    fn every_signal_round_trips() {
        let msgs: Vec<Message> = Signal::ALL
            .iter()
            .map(|s| Directive::Signal(*s).into())
            .collect();
        let mut r = reader(frame(&msgs));
        for expected in &msgs {
            assert_eq!(&r.recv().unwrap(), expected);
        }
    }

    #[test]
    fn initiate_profiling_is_a_complex_directive() {
        let msg = Directive::InitiateProfiling(InitiateProfiling::new(
            InstrType::RecursiveFull,
            vec!["Main".into()],
        ));
        let bytes = frame(&[Message::from(msg.clone())]);
        assert_eq!(bytes[0], COMPLEX_DIRECTIVE);
        assert_eq!(bytes[1], DirectiveKind::InitiateProfiling.code());

        match reader(bytes).recv_directive().unwrap() {
            Directive::InitiateProfiling(p) => {
                assert_eq!(p.instr_type, InstrType::RecursiveFull);
                assert_eq!(p.root_class_names, vec!["Main".to_owned()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failed_simple_reply_layout() {
        let bytes = frame(&[Message::from(Reply::failed("target disconnected"))]);
        let mut expected = vec![SIMPLE_REPLY, 0, 1];
        expected.extend_from_slice(&19i32.to_be_bytes());
        expected.extend_from_slice(b"target disconnected");
        assert_eq!(bytes, expected);

        let reply = reader(bytes).recv_reply().unwrap();
        assert!(!reply.ok);
        assert_eq!(reply.error.as_deref(), Some("target disconnected"));
        assert_eq!(reply.body, ReplyBody::Ack);
    }

    #[test]
    fn unknown_codes_are_fatal() {
        for bytes in [
            vec![COMPLEX_DIRECTIVE, 99],
            vec![COMPLEX_REPLY, 99, 1, 0],
            vec![SIMPLE_DIRECTIVE, 0],
            // A payload kind under the signal control byte.
            vec![SIMPLE_DIRECTIVE, DirectiveKind::ClassLoaded.code()],
            // A signal code under the directive control byte.
            vec![COMPLEX_DIRECTIVE, Signal::RunGc.code()],
            vec![0],
            vec![5],
        ] {
            let err = reader(bytes.clone()).recv().unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidData, "{bytes:?}");
        }
    }

    #[test]
    fn truncated_frame_is_eof() {
        let mut bytes = frame(&[Message::from(Directive::TakeHeapDump(
            TakeHeapDump::new("/tmp/h.hprof"),
        ))]);
        bytes.truncate(bytes.len() - 3);
        let err = reader(bytes).recv().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn wrong_family_is_rejected() {
        let bytes = frame(&[Message::from(Reply::ack())]);
        assert!(reader(bytes.clone()).recv_directive().is_err());
        assert!(reader(bytes).recv_reply().is_ok());
    }

    #[test]
    fn reader_counts_integrity_faults() {
        let dump = ThreadDump {
            time_millis: 1,
            threads: Vec::new(),
        };
        let mut bytes = frame(&[Message::from(Reply::with_body(
            ReplyBody::ThreadDump(dump.clone()),
        ))]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;

        let mut r = reader(bytes);
        let msg = r.recv().unwrap();
        assert_eq!(msg, Message::from(Reply::with_body(ReplyBody::ThreadDump(dump))));
        assert_eq!(r.integrity_faults(), 1);
    }

    #[test]
    fn concurrent_senders_never_interleave() {
        const THREADS: i32 = 8;
        const PER_THREAD: i32 = 50;

        let writer = WireWriter::new(Vec::new(), WireConfig::default());
        thread::scope(|s| {
            for t in 0..THREADS {
                let writer = &writer;
                s.spawn(move || {
                    for i in 0..PER_THREAD {
                        let msg = Directive::AsyncMessage(AsyncMessage::new(
                            true,
                            format!("{t}:{i}:{}", "x".repeat(usize::try_from(i).unwrap())),
                        ));
                        writer.send_directive(&msg).unwrap();
                    }
                });
            }
        });

        let mut r = reader(writer.into_inner().unwrap());
        let mut next = vec![0; usize::try_from(THREADS).unwrap()];
        for _ in 0..THREADS * PER_THREAD {
            let Directive::AsyncMessage(m) = r.recv_directive().unwrap() else {
                panic!("unexpected directive");
            };
            let mut parts = m.message.splitn(3, ':');
            let t: usize = parts.next().unwrap().parse().unwrap();
            let i: i32 = parts.next().unwrap().parse().unwrap();
            assert_eq!(i, next[t], "thread {t} messages reordered");
            next[t] += 1;
        }
        assert!(r.try_recv().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn exchange_over_socket_pair() {
        let (a, b) = UnixStream::pair().unwrap();
        let controller = Channel::over_unix(a, WireConfig::default()).unwrap();
        let agent = Channel::over_unix(b, WireConfig::default()).unwrap();
        let (mut agent_rx, agent_tx) = agent.split();

        let handle = thread::spawn(move || {
            let d = agent_rx.recv_directive().unwrap();
            assert_eq!(d.signal(), Some(Signal::CheckConnection));
            agent_tx.send_reply(&Reply::ack()).unwrap();
        });

        let (mut rx, tx) = controller.split();
        tx.send_directive(&Signal::CheckConnection.into()).unwrap();
        assert_eq!(rx.recv_reply().unwrap(), Reply::ack());
        handle.join().unwrap();
    }
}

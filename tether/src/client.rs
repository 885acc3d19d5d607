//! Controller-side client for a profiler agent.
//!
//! The agent may push its own directives (class loads, buffer dumps, status
//! messages) at any time, including while the controller waits for a reply.
//! [`Client::call`] parks those in a queue drained by
//! [`Client::next_directive`].

use std::collections::VecDeque;
use std::io::{BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(unix)]
use std::path::Path;
use std::sync::Arc;

use tether_proto::{
    CalibrationData, Channel, ChangeableInstrParams, ClassQuery, Directive, GetMethodNames,
    HeapHistogram, InitiateProfiling, InternalStats, Message, MethodNames, MonitoredNumbers,
    Reply, ReplyBody, ReplyKind, Signal, TakeHeapDump, ThreadDump, UnchangeableInstrParams,
    VmProperties, WireConfig, WireReader, WireWriter,
};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// A controller connection to a running agent.
#[derive(Debug)]
pub struct Client<R = BufReader<TcpStream>, W = TcpStream> {
    /// Receiving half.
    reader: WireReader<R>,
    /// Sending half, shareable with threads answering agent requests.
    writer: Arc<WireWriter<W>>,
    /// Agent directives received while waiting for a reply.
    pending: VecDeque<Directive>,
}

impl Client {
    /// Connects to an agent listening on TCP.
    pub fn connect(addr: impl ToSocketAddrs, config: WireConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Ok(Self::new(Channel::over_tcp(stream, config)?))
    }
}

#[cfg(unix)]
impl Client<BufReader<UnixStream>, UnixStream> {
    /// Connects to an agent listening on a Unix socket.
    pub fn connect_unix(path: impl AsRef<Path>, config: WireConfig) -> Result<Self> {
        let stream = UnixStream::connect(path)?;
        Ok(Self::new(Channel::over_unix(stream, config)?))
    }
}

impl<R: Read, W: Write> Client<R, W> {
    /// Wraps an established channel.
    pub fn new(channel: Channel<R, W>) -> Self {
        let (reader, writer) = channel.split();
        Self {
            reader,
            writer,
            pending: VecDeque::new(),
        }
    }

    /// The sending half, for answering agent directives from another thread.
    pub fn writer(&self) -> Arc<WireWriter<W>> {
        Arc::clone(&self.writer)
    }

    /// Compressed sections received with a failed integrity check.
    pub const fn integrity_faults(&self) -> u64 {
        self.reader.integrity_faults()
    }

    /// Sends a directive and waits for its reply.
    ///
    /// A failed reply is returned as-is; see [`Client::call_ok`].
    pub fn call(&mut self, directive: &Directive) -> Result<Reply> {
        self.writer.send_directive(directive)?;
        loop {
            match self.reader.recv()? {
                Message::Reply(reply) => return Ok(reply),
                Message::Directive(Directive::Signal(Signal::StillAlive)) => {
                    trace!(request = directive.name(), "agent still working");
                }
                Message::Directive(d) => {
                    debug!(directive = d.name(), "queued agent directive");
                    self.pending.push_back(d);
                }
                _ => {}
            }
        }
    }

    /// Sends a directive and returns the reply payload, failing if the agent
    /// rejected the request.
    pub fn call_ok(&mut self, directive: &Directive) -> Result<ReplyBody> {
        Ok(self.call(directive)?.into_result()?)
    }

    /// Sends a reply to a directive the agent initiated.
    pub fn reply(&self, reply: &Reply) -> Result<()> {
        Ok(self.writer.send_reply(reply)?)
    }

    /// Sends a directive that expects no reply.
    pub fn notify(&self, directive: &Directive) -> Result<()> {
        Ok(self.writer.send_directive(directive)?)
    }

    /// Returns the next agent directive, queued ones first. `None` means the
    /// agent closed the connection.
    pub fn next_directive(&mut self) -> Result<Option<Directive>> {
        if let Some(d) = self.pending.pop_front() {
            return Ok(Some(d));
        }
        match self.reader.try_recv()? {
            None => Ok(None),
            Some(Message::Directive(d)) => Ok(Some(d)),
            Some(Message::Reply(r)) => Err(Error::UnexpectedReply {
                expected: "no",
                got: r.name(),
            }),
            Some(_) => Ok(None),
        }
    }

    /// Sends `directive` and extracts the expected payload with `pick`.
    fn request<T>(
        &mut self,
        directive: &Directive,
        expected: ReplyKind,
        pick: impl FnOnce(ReplyBody) -> Option<T>,
    ) -> Result<T> {
        let body = self.call_ok(directive)?;
        let got = body.kind().map_or("Ack", ReplyKind::name);
        pick(body).ok_or(Error::UnexpectedReply {
            expected: expected.name(),
            got,
        })
    }

    /// Sends `directive` and expects a plain acknowledgement.
    fn command(&mut self, directive: &Directive) -> Result<()> {
        match self.call_ok(directive)? {
            ReplyBody::Ack => Ok(()),
            other => Err(Error::UnexpectedReply {
                expected: "Ack",
                got: other.kind().map_or("Ack", ReplyKind::name),
            }),
        }
    }

    /// Liveness probe.
    pub fn check_connection(&mut self) -> Result<()> {
        self.command(&Signal::CheckConnection.into())
    }

    /// Lets the target application start running.
    pub fn start_target_app(&mut self) -> Result<()> {
        self.command(&Signal::StartTargetApp.into())
    }

    /// Suspends all application threads.
    pub fn suspend_target_app(&mut self) -> Result<()> {
        self.command(&Signal::SuspendTargetApp.into())
    }

    /// Resumes all application threads.
    pub fn resume_target_app(&mut self) -> Result<()> {
        self.command(&Signal::ResumeTargetApp.into())
    }

    /// Runs a full garbage collection in the target.
    pub fn run_gc(&mut self) -> Result<()> {
        self.command(&Signal::RunGc.into())
    }

    /// Drops all data collected so far.
    pub fn reset_collectors(&mut self) -> Result<()> {
        self.command(&Signal::ResetProfilerCollectors.into())
    }

    /// Updates parameters that may change mid-session.
    pub fn set_changeable_params(&mut self, params: ChangeableInstrParams) -> Result<()> {
        self.command(&Directive::SetChangeableInstrParams(params))
    }

    /// Sets parameters fixed for the session.
    pub fn set_unchangeable_params(&mut self, params: UnchangeableInstrParams) -> Result<()> {
        self.command(&Directive::SetUnchangeableInstrParams(params))
    }

    /// Starts profiling.
    pub fn initiate_profiling(&mut self, request: InitiateProfiling) -> Result<()> {
        self.command(&Directive::InitiateProfiling(request))
    }

    /// Writes a heap dump to `output_file` on the target machine.
    pub fn take_heap_dump(&mut self, output_file: impl Into<String>) -> Result<()> {
        self.command(&Directive::TakeHeapDump(TakeHeapDump::new(output_file)))
    }

    /// Flushes collected results; returns the dump timestamp.
    pub fn dump_results(&mut self, live: bool) -> Result<i64> {
        let signal = if live {
            Signal::DumpExistingResultsLive
        } else {
            Signal::DumpExistingResults
        };
        self.request(&signal.into(), ReplyKind::DumpResults, |b| match b {
            ReplyBody::DumpResults(ts) => Some(ts),
            _ => None,
        })
    }

    /// Current memory, thread and GC counters.
    pub fn monitored_numbers(&mut self) -> Result<MonitoredNumbers> {
        self.request(
            &Signal::GetMonitoredNumbers.into(),
            ReplyKind::MonitoredNumbers,
            |b| match b {
                ReplyBody::MonitoredNumbers(n) => Some(n),
                _ => None,
            },
        )
    }

    /// Live instances per class.
    pub fn heap_histogram(&mut self) -> Result<HeapHistogram> {
        self.request(
            &Signal::GetHeapHistogram.into(),
            ReplyKind::HeapHistogram,
            |b| match b {
                ReplyBody::HeapHistogram(h) => Some(h),
                _ => None,
            },
        )
    }

    /// Stack traces of every live thread.
    pub fn thread_dump(&mut self) -> Result<ThreadDump> {
        self.request(&Signal::GetThreadDump.into(), ReplyKind::ThreadDump, |b| match b {
            ReplyBody::ThreadDump(t) => Some(t),
            _ => None,
        })
    }

    /// Target VM properties.
    pub fn vm_properties(&mut self) -> Result<VmProperties> {
        self.request(&Signal::GetVmProperties.into(), ReplyKind::VmProperties, |b| match b {
            ReplyBody::VmProperties(p) => Some(p),
            _ => None,
        })
    }

    /// Calibration data, either stored on the target or freshly measured.
    pub fn calibration_data(&mut self, recalibrate: bool) -> Result<CalibrationData> {
        let signal = if recalibrate {
            Signal::RunCalibrationAndGetData
        } else {
            Signal::GetStoredCalibrationData
        };
        self.request(&signal.into(), ReplyKind::CalibrationData, |b| match b {
            ReplyBody::CalibrationData(c) => Some(c),
            _ => None,
        })
    }

    /// Agent-internal counters.
    pub fn internal_stats(&mut self) -> Result<InternalStats> {
        self.request(&Signal::GetInternalStats.into(), ReplyKind::InternalStats, |b| match b {
            ReplyBody::InternalStats(s) => Some(s),
            _ => None,
        })
    }

    /// Code-region durations collected so far.
    pub fn code_region_results(&mut self) -> Result<Vec<i64>> {
        self.request(
            &Signal::GetCodeRegionCpuResults.into(),
            ReplyKind::CodeRegionCpuResults,
            |b| match b {
                ReplyBody::CodeRegionCpuResults(v) => Some(v),
                _ => None,
            },
        )
    }

    /// Allocation counts indexed by class id.
    pub fn object_allocation_results(&mut self) -> Result<Vec<i32>> {
        self.request(
            &Signal::GetObjectAllocationResults.into(),
            ReplyKind::ObjectAllocationResults,
            |b| match b {
                ReplyBody::ObjectAllocationResults(v) => Some(v),
                _ => None,
            },
        )
    }

    /// Liveness of each profiled thread.
    pub fn thread_liveness(&mut self) -> Result<Vec<bool>> {
        self.request(
            &Signal::GetThreadLivenessStatus.into(),
            ReplyKind::ThreadLivenessStatus,
            |b| match b {
                ReplyBody::ThreadLivenessStatus(v) => Some(v),
                _ => None,
            },
        )
    }

    /// Resolves method ids to names.
    pub fn method_names(&mut self, method_ids: Vec<i32>) -> Result<MethodNames> {
        self.request(
            &Directive::GetMethodNames(GetMethodNames::new(method_ids)),
            ReplyKind::MethodNames,
            |b| match b {
                ReplyBody::MethodNames(n) => Some(n),
                _ => None,
            },
        )
    }

    /// Id of the loader that defined `query`'s class.
    pub fn defining_class_loader(&mut self, query: ClassQuery) -> Result<i32> {
        self.request(
            &Directive::GetDefiningClassLoader(query),
            ReplyKind::DefiningLoader,
            |b| match b {
                ReplyBody::DefiningLoader(id) => Some(id),
                _ => None,
            },
        )
    }

    /// Id the agent assigned to `query`'s class.
    pub fn class_id(&mut self, query: ClassQuery) -> Result<i32> {
        self.request(&Directive::GetClassId(query), ReplyKind::ClassId, |b| match b {
            ReplyBody::ClassId(id) => Some(id),
            _ => None,
        })
    }

    /// Detaches from the target, leaving it running.
    pub fn detach(&mut self) -> Result<()> {
        self.command(&Signal::Detach.into())
    }

    /// Terminates the target VM.
    pub fn terminate(&mut self) -> Result<()> {
        self.command(&Signal::TerminateTargetJvm.into())
    }
}

//! Replies: outcome, optional error text and optional result payload.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::directive::MethodGroup;
use crate::kind::ReplyKind;
use crate::names::MethodNames;
use crate::telemetry::{HeapHistogram, MonitoredNumbers, ThreadDump};
use crate::wire::{Decoder, Encoder, WireCodec};

/// The peer reported that a request failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Rejected {
    /// Error text sent by the peer.
    pub message: String,
}

/// Response to a directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// The request succeeded.
    pub ok: bool,
    /// Human-readable failure reason.
    pub error: Option<String>,
    /// Result payload.
    pub body: ReplyBody,
}

impl Reply {
    /// Successful reply without payload.
    pub const fn ack() -> Self {
        Self {
            ok: true,
            error: None,
            body: ReplyBody::Ack,
        }
    }

    /// Failed reply without payload.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            body: ReplyBody::Ack,
        }
    }

    /// Successful reply carrying `body`.
    pub const fn with_body(body: ReplyBody) -> Self {
        Self {
            ok: true,
            error: None,
            body,
        }
    }

    /// Payload kind, or `None` for a simple reply.
    pub const fn kind(&self) -> Option<ReplyKind> {
        self.body.kind()
    }

    /// Variant name, as shown in logs.
    pub const fn name(&self) -> &'static str {
        match self.body.kind() {
            Some(kind) => kind.name(),
            None => "Ack",
        }
    }

    /// Whether the peer reported success.
    pub const fn is_ok(&self) -> bool {
        self.ok
    }

    /// The payload, or the peer's error if the request failed.
    pub fn into_result(self) -> Result<ReplyBody, Rejected> {
        if self.ok {
            Ok(self.body)
        } else {
            Err(Rejected {
                message: self.error.unwrap_or_else(|| "request failed".to_owned()),
            })
        }
    }
}

impl From<ReplyBody> for Reply {
    fn from(body: ReplyBody) -> Self {
        Self::with_body(body)
    }
}

/// Result payload of a [`Reply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ReplyBody {
    /// No payload.
    Ack,
    /// Instrumentation overhead measurements.
    CalibrationData(CalibrationData),
    /// Code-region durations, in timer counts.
    CodeRegionCpuResults(Vec<i64>),
    /// Id of a class's defining loader.
    DefiningLoader(i32),
    /// Absolute timestamp of a results dump.
    DumpResults(i64),
    /// Id assigned to a class.
    ClassId(i32),
    /// Live instances per class.
    HeapHistogram(HeapHistogram),
    /// Agent → controller: request to instrument a method group.
    InstrumentMethodGroup(Option<MethodGroup>),
    /// Agent-internal counters.
    InternalStats(InternalStats),
    /// Resolved method names.
    MethodNames(MethodNames),
    /// Memory, thread and GC telemetry.
    MonitoredNumbers(MonitoredNumbers),
    /// Allocation counts indexed by class id.
    ObjectAllocationResults(Vec<i32>),
    /// Liveness per profiled thread.
    ThreadLivenessStatus(Vec<bool>),
    /// Target VM properties.
    VmProperties(VmProperties),
    /// Stack traces of every live thread.
    ThreadDump(ThreadDump),
}

impl ReplyBody {
    /// Payload kind, or `None` for [`ReplyBody::Ack`].
    pub const fn kind(&self) -> Option<ReplyKind> {
        Some(match self {
            Self::Ack => return None,
            Self::CalibrationData(_) => ReplyKind::CalibrationData,
            Self::CodeRegionCpuResults(_) => ReplyKind::CodeRegionCpuResults,
            Self::DefiningLoader(_) => ReplyKind::DefiningLoader,
            Self::DumpResults(_) => ReplyKind::DumpResults,
            Self::ClassId(_) => ReplyKind::ClassId,
            Self::HeapHistogram(_) => ReplyKind::HeapHistogram,
            Self::InstrumentMethodGroup(_) => ReplyKind::InstrumentMethodGroup,
            Self::InternalStats(_) => ReplyKind::InternalStats,
            Self::MethodNames(_) => ReplyKind::MethodNames,
            Self::MonitoredNumbers(_) => ReplyKind::MonitoredNumbers,
            Self::ObjectAllocationResults(_) => ReplyKind::ObjectAllocationResults,
            Self::ThreadLivenessStatus(_) => ReplyKind::ThreadLivenessStatus,
            Self::VmProperties(_) => ReplyKind::VmProperties,
            Self::ThreadDump(_) => ReplyKind::ThreadDump,
        })
    }

    /// Writes the payload fields. [`ReplyBody::Ack`] has none.
    pub fn encode_payload<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        match self {
            Self::Ack => Ok(()),
            Self::CalibrationData(p) => p.encode(e),
            Self::CodeRegionCpuResults(v) => e.write_i64s(v),
            Self::DefiningLoader(id) | Self::ClassId(id) => e.write_i32(*id),
            Self::DumpResults(ts) => e.write_i64(*ts),
            Self::HeapHistogram(p) => p.encode(e),
            Self::InstrumentMethodGroup(p) => p.encode(e),
            Self::InternalStats(p) => p.encode(e),
            Self::MethodNames(p) => p.encode(e),
            Self::MonitoredNumbers(p) => p.encode(e),
            Self::ObjectAllocationResults(v) => e.write_i32s(v),
            Self::ThreadLivenessStatus(v) => e.write_bools(v),
            Self::VmProperties(p) => p.encode(e),
            Self::ThreadDump(p) => p.encode(e),
        }
    }

    /// Reads the payload of a reply of the given kind.
    pub fn decode_payload<R: Read>(kind: ReplyKind, d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(match kind {
            ReplyKind::CalibrationData => Self::CalibrationData(d.read()?),
            ReplyKind::CodeRegionCpuResults => Self::CodeRegionCpuResults(d.read_i64s()?),
            ReplyKind::DefiningLoader => Self::DefiningLoader(d.read_i32()?),
            ReplyKind::DumpResults => Self::DumpResults(d.read_i64()?),
            ReplyKind::ClassId => Self::ClassId(d.read_i32()?),
            ReplyKind::HeapHistogram => Self::HeapHistogram(d.read()?),
            ReplyKind::InstrumentMethodGroup => Self::InstrumentMethodGroup(d.read()?),
            ReplyKind::InternalStats => Self::InternalStats(d.read()?),
            ReplyKind::MethodNames => Self::MethodNames(d.read()?),
            ReplyKind::MonitoredNumbers => Self::MonitoredNumbers(d.read()?),
            ReplyKind::ObjectAllocationResults => Self::ObjectAllocationResults(d.read_i32s()?),
            ReplyKind::ThreadLivenessStatus => Self::ThreadLivenessStatus(d.read_bools()?),
            ReplyKind::VmProperties => Self::VmProperties(d.read()?),
            ReplyKind::ThreadDump => Self::ThreadDump(d.read()?),
        })
    }
}

/// Measured cost of the injected method entry/exit hooks.
///
/// Each array has one value per timer mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    /// Time of one hook call, as seen by the caller.
    pub call_time: Vec<f64>,
    /// Part of the call time attributed to the callee.
    pub inner_time: Vec<f64>,
    /// Part of the call time attributed to the caller.
    pub outer_time: Vec<f64>,
    /// Timer resolution per timer mode.
    pub timer_counts_in_second: Vec<i64>,
}

impl WireCodec for CalibrationData {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_f64s(&self.call_time)?;
        e.write_f64s(&self.inner_time)?;
        e.write_f64s(&self.outer_time)?;
        e.write_i64s(&self.timer_counts_in_second)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(Self {
            call_time: d.read_f64s()?,
            inner_time: d.read_f64s()?,
            outer_time: d.read_f64s()?,
            timer_counts_in_second: d.read_i64s()?,
        })
    }
}

/// Counters and timings of the agent's own work. Times are in milliseconds
/// unless noted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalStats {
    /// Methods instrumented so far.
    pub n_total_instr_methods: i32,
    /// Class load events handled.
    pub n_class_loads: i32,
    /// First-invocation events handled.
    pub n_first_method_invocations: i32,
    /// Method group replies that redefined classes.
    pub n_non_empty_instr_method_group_responses: i32,
    /// Method group replies with nothing to redefine.
    pub n_empty_instr_method_group_responses: i32,
    /// Method group replies that redefined a single method.
    pub n_single_method_instr_method_group_responses: i32,
    /// Time the controller spent building instrumentation.
    pub client_instr_time: f64,
    /// Time the controller spent processing event buffers.
    pub client_data_proc_time: f64,
    /// Total class redefinition time.
    pub total_hotswapping_time: f64,
    /// Mean class redefinition time.
    pub average_hotswapping_time: f64,
    /// Shortest class redefinition.
    pub min_hotswapping_time: f64,
    /// Longest class redefinition.
    pub max_hotswapping_time: f64,
    /// Hook call time per timer mode, in microseconds.
    pub method_entry_exit_call_time: [f64; 3],
}

impl WireCodec for InternalStats {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        for n in [
            self.n_total_instr_methods,
            self.n_class_loads,
            self.n_first_method_invocations,
            self.n_non_empty_instr_method_group_responses,
            self.n_empty_instr_method_group_responses,
            self.n_single_method_instr_method_group_responses,
        ] {
            e.write_i32(n)?;
        }
        for t in [
            self.client_instr_time,
            self.client_data_proc_time,
            self.total_hotswapping_time,
            self.average_hotswapping_time,
            self.min_hotswapping_time,
            self.max_hotswapping_time,
        ] {
            e.write_f64(t)?;
        }
        self.method_entry_exit_call_time
            .iter()
            .try_for_each(|t| e.write_f64(*t))
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(Self {
            n_total_instr_methods: d.read_i32()?,
            n_class_loads: d.read_i32()?,
            n_first_method_invocations: d.read_i32()?,
            n_non_empty_instr_method_group_responses: d.read_i32()?,
            n_empty_instr_method_group_responses: d.read_i32()?,
            n_single_method_instr_method_group_responses: d.read_i32()?,
            client_instr_time: d.read_f64()?,
            client_data_proc_time: d.read_f64()?,
            total_hotswapping_time: d.read_f64()?,
            average_hotswapping_time: d.read_f64()?,
            min_hotswapping_time: d.read_f64()?,
            max_hotswapping_time: d.read_f64()?,
            method_entry_exit_call_time: [d.read_f64()?, d.read_f64()?, d.read_f64()?],
        })
    }
}

/// Properties of the target VM, sent once after connecting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmProperties {
    /// Java specification version, e.g. `"17"`.
    pub jdk_version: String,
    /// `java.class.path`.
    pub java_class_path: String,
    /// `java.ext.dirs`; absent on modular runtimes.
    pub java_ext_dirs: Option<String>,
    /// Boot class path; absent on modular runtimes.
    pub boot_class_path: Option<String>,
    /// `user.dir`.
    pub working_dir: String,
    /// VM arguments, space separated.
    pub jvm_arguments: String,
    /// `sun.java.command`.
    pub java_command: String,
    /// `os.name`.
    pub target_os: String,
    /// Maximum heap size, in bytes.
    pub max_heap_size: i64,
    /// VM start time, in milliseconds since the epoch.
    pub startup_time_millis: i64,
    /// VM start time, in high-resolution timer counts.
    pub startup_time_in_counts: i64,
    /// Process id of the target.
    pub agent_id: i32,
    /// Agent protocol version.
    pub agent_version: i32,
}

impl WireCodec for VmProperties {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_str(&self.jdk_version)?;
        e.write_str(&self.java_class_path)?;
        e.write_opt_str(self.java_ext_dirs.as_deref())?;
        e.write_opt_str(self.boot_class_path.as_deref())?;
        e.write_str(&self.working_dir)?;
        e.write_str(&self.jvm_arguments)?;
        e.write_str(&self.java_command)?;
        e.write_str(&self.target_os)?;
        e.write_i64(self.max_heap_size)?;
        e.write_i64(self.startup_time_millis)?;
        e.write_i64(self.startup_time_in_counts)?;
        e.write_i32(self.agent_id)?;
        e.write_i32(self.agent_version)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(Self {
            jdk_version: d.read_string()?,
            java_class_path: d.read_string()?,
            java_ext_dirs: d.read_opt_string()?,
            boot_class_path: d.read_opt_string()?,
            working_dir: d.read_string()?,
            jvm_arguments: d.read_string()?,
            java_command: d.read_string()?,
            target_os: d.read_string()?,
            max_heap_size: d.read_i64()?,
            startup_time_millis: d.read_i64()?,
            startup_time_in_counts: d.read_i64()?,
            agent_id: d.read_i32()?,
            agent_version: d.read_i32()?,
        })
    }
}

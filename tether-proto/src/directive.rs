//! Directives: requests and event notifications.
//!
//! Payload-less directives are [`Signal`]s. Every other directive owns a
//! typed payload, and its wire code is derived from the enum variant.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::event_buffer::EventBufferDumped;
use crate::kind::{DirectiveKind, InstrScheme, InstrType, Signal};
use crate::wire::{Decoder, Encoder, WireCodec, check_parallel};

/// A request or notification travelling in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Directive {
    /// A directive without payload.
    Signal(Signal),
    /// Adjust instrumentation parameters mid-session.
    SetChangeableInstrParams(ChangeableInstrParams),
    /// Fix parameters that cannot change once profiling starts.
    SetUnchangeableInstrParams(UnchangeableInstrParams),
    /// Start profiling.
    InitiateProfiling(InitiateProfiling),
    /// Controller → agent: inject instrumentation into a method group.
    InstrumentMethodGroup(InstrumentMethodGroup),
    /// Agent → controller: a class was loaded.
    ClassLoaded(ClassLoaded),
    /// Agent → controller: the profiling roots' classes were loaded.
    RootClassLoaded(RootClassLoaded),
    /// Agent → controller: a method was linked.
    MethodLoaded(MethodLoaded),
    /// Agent → controller: a method ran for the first time.
    MethodInvokedFirstTime(MethodInvokedFirstTime),
    /// Agent → controller: the event buffer was dumped.
    EventBufferDumped(EventBufferDumped),
    /// Resolve method ids to names.
    GetMethodNames(GetMethodNames),
    /// Look up a class's defining loader.
    GetDefiningClassLoader(ClassQuery),
    /// Look up a class's id.
    GetClassId(ClassQuery),
    /// Write a heap dump on the target machine.
    TakeHeapDump(TakeHeapDump),
    /// Agent → controller: a message for the user.
    AsyncMessage(AsyncMessage),
}

impl Directive {
    /// The table entry naming this directive: a payload kind, or the signal.
    const fn entry(&self) -> Result<DirectiveKind, Signal> {
        Ok(match self {
            Self::Signal(s) => return Err(*s),
            Self::SetChangeableInstrParams(_) => DirectiveKind::SetChangeableInstrParams,
            Self::SetUnchangeableInstrParams(_) => DirectiveKind::SetUnchangeableInstrParams,
            Self::InitiateProfiling(_) => DirectiveKind::InitiateProfiling,
            Self::InstrumentMethodGroup(_) => DirectiveKind::InstrumentMethodGroup,
            Self::ClassLoaded(_) => DirectiveKind::ClassLoaded,
            Self::RootClassLoaded(_) => DirectiveKind::RootClassLoaded,
            Self::MethodLoaded(_) => DirectiveKind::MethodLoaded,
            Self::MethodInvokedFirstTime(_) => DirectiveKind::MethodInvokedFirstTime,
            Self::EventBufferDumped(_) => DirectiveKind::EventBufferDumped,
            Self::GetMethodNames(_) => DirectiveKind::GetMethodNamesForJMethodIds,
            Self::GetDefiningClassLoader(_) => DirectiveKind::GetDefiningClassLoader,
            Self::GetClassId(_) => DirectiveKind::GetClassId,
            Self::TakeHeapDump(_) => DirectiveKind::TakeHeapDump,
            Self::AsyncMessage(_) => DirectiveKind::AsyncMessage,
        })
    }

    /// Payload kind, or `None` for a signal.
    pub const fn kind(&self) -> Option<DirectiveKind> {
        match self.entry() {
            Ok(kind) => Some(kind),
            Err(_) => None,
        }
    }

    /// The signal, if this directive is one.
    pub const fn signal(&self) -> Option<Signal> {
        match self.entry() {
            Ok(_) => None,
            Err(s) => Some(s),
        }
    }

    /// Wire code of this directive, from whichever table it belongs to.
    pub const fn code(&self) -> u8 {
        match self.entry() {
            Ok(kind) => kind.code(),
            Err(s) => s.code(),
        }
    }

    /// Variant name, as shown in logs.
    pub const fn name(&self) -> &'static str {
        match self.entry() {
            Ok(kind) => kind.name(),
            Err(s) => s.name(),
        }
    }

    /// Writes the payload fields. Signals have none.
    pub fn encode_payload<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        match self {
            Self::Signal(_) => Ok(()),
            Self::SetChangeableInstrParams(p) => p.encode(e),
            Self::SetUnchangeableInstrParams(p) => p.encode(e),
            Self::InitiateProfiling(p) => p.encode(e),
            Self::InstrumentMethodGroup(p) => p.encode(e),
            Self::ClassLoaded(p) => p.encode(e),
            Self::RootClassLoaded(p) => p.encode(e),
            Self::MethodLoaded(p) => p.encode(e),
            Self::MethodInvokedFirstTime(p) => p.encode(e),
            Self::EventBufferDumped(p) => p.encode(e),
            Self::GetMethodNames(p) => p.encode(e),
            Self::GetDefiningClassLoader(p) | Self::GetClassId(p) => p.encode(e),
            Self::TakeHeapDump(p) => p.encode(e),
            Self::AsyncMessage(p) => p.encode(e),
        }
    }

    /// Reads the payload of a directive of the given kind.
    pub fn decode_payload<R: Read>(kind: DirectiveKind, d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(match kind {
            DirectiveKind::SetChangeableInstrParams => Self::SetChangeableInstrParams(d.read()?),
            DirectiveKind::SetUnchangeableInstrParams => {
                Self::SetUnchangeableInstrParams(d.read()?)
            }
            DirectiveKind::InitiateProfiling => Self::InitiateProfiling(d.read()?),
            DirectiveKind::InstrumentMethodGroup => Self::InstrumentMethodGroup(d.read()?),
            DirectiveKind::ClassLoaded => Self::ClassLoaded(d.read()?),
            DirectiveKind::RootClassLoaded => Self::RootClassLoaded(d.read()?),
            DirectiveKind::MethodLoaded => Self::MethodLoaded(d.read()?),
            DirectiveKind::MethodInvokedFirstTime => Self::MethodInvokedFirstTime(d.read()?),
            DirectiveKind::EventBufferDumped => Self::EventBufferDumped(d.read()?),
            DirectiveKind::GetMethodNamesForJMethodIds => Self::GetMethodNames(d.read()?),
            DirectiveKind::GetDefiningClassLoader => Self::GetDefiningClassLoader(d.read()?),
            DirectiveKind::GetClassId => Self::GetClassId(d.read()?),
            DirectiveKind::TakeHeapDump => Self::TakeHeapDump(d.read()?),
            DirectiveKind::AsyncMessage => Self::AsyncMessage(d.read()?),
        })
    }
}

impl From<Signal> for Directive {
    fn from(s: Signal) -> Self {
        Self::Signal(s)
    }
}

// ---------------------------------------------------------------------------
// Instrumentation parameters
// ---------------------------------------------------------------------------

/// Parameters the controller may change while profiling runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeableInstrParams {
    /// Track monitor contention.
    pub lock_contention_monitoring: bool,
    /// Maximum number of threads profiled; negative means unlimited.
    pub n_profiled_threads_limit: i32,
    /// Sampling interval for sampled instrumentation, in milliseconds.
    pub sampling_interval: i32,
    /// Record an allocation stack every N allocations.
    pub obj_alloc_stack_sampling_interval: i32,
    /// Maximum depth of an allocation stack; negative means unlimited.
    pub obj_alloc_stack_sampling_depth: i32,
    /// Run a GC before answering results requests.
    pub run_gc_on_get_results: bool,
    /// Record time spent in `Object.wait`.
    pub wait_tracking: bool,
    /// Record time spent in `Thread.sleep`.
    pub sleep_tracking: bool,
    /// Sample thread states.
    pub threads_sampling: bool,
    /// Thread state samples per second.
    pub thread_sampling_frequency: i32,
}

impl WireCodec for ChangeableInstrParams {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_bool(self.lock_contention_monitoring)?;
        e.write_i32(self.n_profiled_threads_limit)?;
        e.write_i32(self.sampling_interval)?;
        e.write_i32(self.obj_alloc_stack_sampling_interval)?;
        e.write_i32(self.obj_alloc_stack_sampling_depth)?;
        e.write_bool(self.run_gc_on_get_results)?;
        e.write_bool(self.wait_tracking)?;
        e.write_bool(self.sleep_tracking)?;
        e.write_bool(self.threads_sampling)?;
        e.write_i32(self.thread_sampling_frequency)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(Self {
            lock_contention_monitoring: d.read_bool()?,
            n_profiled_threads_limit: d.read_i32()?,
            sampling_interval: d.read_i32()?,
            obj_alloc_stack_sampling_interval: d.read_i32()?,
            obj_alloc_stack_sampling_depth: d.read_i32()?,
            run_gc_on_get_results: d.read_bool()?,
            wait_tracking: d.read_bool()?,
            sleep_tracking: d.read_bool()?,
            threads_sampling: d.read_bool()?,
            thread_sampling_frequency: d.read_i32()?,
        })
    }
}

/// Parameters fixed for the lifetime of a profiling session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnchangeableInstrParams {
    /// The controller runs on another machine.
    pub remote_profiling: bool,
    /// Collect wall-clock timestamps.
    pub absolute_timer_on: bool,
    /// Collect per-thread CPU timestamps.
    pub thread_cpu_timer_on: bool,
    /// When instrumentation is injected.
    pub instr_scheme: InstrScheme,
    /// Capacity of the code-region result buffer.
    pub code_region_cpu_res_buf_size: i32,
}

impl Default for UnchangeableInstrParams {
    fn default() -> Self {
        Self {
            remote_profiling: false,
            absolute_timer_on: true,
            thread_cpu_timer_on: false,
            instr_scheme: InstrScheme::Lazy,
            code_region_cpu_res_buf_size: 1000,
        }
    }
}

impl WireCodec for UnchangeableInstrParams {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_bool(self.remote_profiling)?;
        e.write_bool(self.absolute_timer_on)?;
        e.write_bool(self.thread_cpu_timer_on)?;
        e.write(&self.instr_scheme)?;
        e.write_i32(self.code_region_cpu_res_buf_size)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(Self {
            remote_profiling: d.read_bool()?,
            absolute_timer_on: d.read_bool()?,
            thread_cpu_timer_on: d.read_bool()?,
            instr_scheme: d.read()?,
            code_region_cpu_res_buf_size: d.read_i32()?,
        })
    }
}

/// Starts a profiling session of the given type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateProfiling {
    /// Profiling mode.
    pub instr_type: InstrType,
    /// Classes whose methods are the instrumentation roots.
    pub root_class_names: Vec<String>,
    /// Ids of the profiling points to install.
    pub profiling_point_ids: Vec<i32>,
    /// Handler class for each profiling point.
    pub profiling_point_handlers: Vec<String>,
    /// Location info for each profiling point.
    pub profiling_point_infos: Vec<String>,
    /// Also instrument threads spawned from the roots.
    pub instr_spawned_threads: bool,
    /// Profiling points are armed from the start.
    pub start_profiling_points_active: bool,
}

impl InitiateProfiling {
    /// A session rooted at `root_class_names`, with no profiling points.
    pub fn new(instr_type: InstrType, root_class_names: Vec<String>) -> Self {
        Self {
            instr_type,
            root_class_names,
            profiling_point_ids: Vec::new(),
            profiling_point_handlers: Vec::new(),
            profiling_point_infos: Vec::new(),
            instr_spawned_threads: false,
            start_profiling_points_active: false,
        }
    }
}

impl WireCodec for InitiateProfiling {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        check_parallel(
            "profiling points",
            &[
                self.profiling_point_ids.len(),
                self.profiling_point_handlers.len(),
                self.profiling_point_infos.len(),
            ],
        )?;
        e.write(&self.instr_type)?;
        e.write_strs(&self.root_class_names)?;
        e.write_i32s(&self.profiling_point_ids)?;
        e.write_strs(&self.profiling_point_handlers)?;
        e.write_strs(&self.profiling_point_infos)?;
        e.write_bool(self.instr_spawned_threads)?;
        e.write_bool(self.start_profiling_points_active)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        let msg = Self {
            instr_type: d.read()?,
            root_class_names: d.read_strings()?,
            profiling_point_ids: d.read_i32s()?,
            profiling_point_handlers: d.read_strings()?,
            profiling_point_infos: d.read_strings()?,
            instr_spawned_threads: d.read_bool()?,
            start_profiling_points_active: d.read_bool()?,
        };
        check_parallel(
            "profiling points",
            &[
                msg.profiling_point_ids.len(),
                msg.profiling_point_handlers.len(),
                msg.profiling_point_infos.len(),
            ],
        )?;
        Ok(msg)
    }
}

// ---------------------------------------------------------------------------
// Method groups
// ---------------------------------------------------------------------------

/// A batch of classes to (re)define with instrumented bytecode.
///
/// `instr_method_classes`, `class_loader_ids` and `replacement_class_bytes`
/// are parallel arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodGroup {
    /// Classes being redefined.
    pub instr_method_classes: Vec<String>,
    /// Defining loader of each class.
    pub class_loader_ids: Vec<i32>,
    /// New class file per class; `None` keeps the current definition.
    pub replacement_class_bytes: Vec<Option<Vec<u8>>>,
    /// Per-method leaf flags, when the scheme tracks them.
    pub instr_method_leaf: Option<Vec<bool>>,
    /// Scheme-specific extra information.
    pub add_info: i32,
}

impl MethodGroup {
    /// Number of classes in the group.
    pub fn len(&self) -> usize {
        self.instr_method_classes.len()
    }

    /// Whether the group holds no classes.
    pub fn is_empty(&self) -> bool {
        self.instr_method_classes.is_empty()
    }

    /// Fails unless the parallel arrays agree in length.
    fn check(&self) -> io::Result<()> {
        check_parallel(
            "method group",
            &[
                self.instr_method_classes.len(),
                self.class_loader_ids.len(),
                self.replacement_class_bytes.len(),
            ],
        )
    }
}

impl WireCodec for MethodGroup {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        self.check()?;
        e.write_strs(&self.instr_method_classes)?;
        e.write_i32s(&self.class_loader_ids)?;
        e.write_blocks(&self.replacement_class_bytes)?;
        e.write_bool(self.instr_method_leaf.is_some())?;
        if let Some(leaf) = &self.instr_method_leaf {
            e.write_bools(leaf)?;
        }
        e.write_i32(self.add_info)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        let group = Self {
            instr_method_classes: d.read_strings()?,
            class_loader_ids: d.read_i32s()?,
            replacement_class_bytes: d.read_blocks()?,
            instr_method_leaf: if d.read_bool()? { Some(d.read_bools()?) } else { None },
            add_info: d.read_i32()?,
        };
        group.check()?;
        Ok(group)
    }
}

/// Controller → agent: apply a method group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentMethodGroup {
    /// Profiling mode the group was built for.
    pub instr_type: InstrType,
    /// The group; `None` when there is nothing to instrument.
    pub group: Option<MethodGroup>,
}

impl WireCodec for InstrumentMethodGroup {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write(&self.instr_type)?;
        e.write(&self.group)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(Self {
            instr_type: d.read()?,
            group: d.read()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Class and method events
// ---------------------------------------------------------------------------

/// A class finished loading in the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLoaded {
    /// Class name in internal form.
    pub class_name: String,
    /// Loader ids from the defining loader up to the bootstrap loader.
    pub loader_chain: Vec<i32>,
    /// Class file bytes, when the agent could capture them.
    pub class_file_bytes: Option<Vec<u8>>,
    /// The class is reachable from the profiling roots.
    pub in_call_graph: bool,
}

impl WireCodec for ClassLoaded {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_str(&self.class_name)?;
        e.write_i32s(&self.loader_chain)?;
        e.write_block(self.class_file_bytes.as_deref())?;
        e.write_bool(self.in_call_graph)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(Self {
            class_name: d.read_string()?,
            loader_chain: d.read_i32s()?,
            class_file_bytes: d.read_block()?,
            in_call_graph: d.read_bool()?,
        })
    }
}

/// Every class loaded before profiling started, sent as one compressed batch.
///
/// The first three arrays are parallel. `parent_loader_ids` maps loader id
/// `i` to its parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootClassLoaded {
    /// Loaded class names.
    pub class_names: Vec<String>,
    /// Defining loader of each class.
    pub loader_ids: Vec<i32>,
    /// Cached class file of each class, if any.
    pub cached_class_bytes: Vec<Option<Vec<u8>>>,
    /// Parent of each known loader, indexed by loader id.
    pub parent_loader_ids: Vec<i32>,
}

impl RootClassLoaded {
    /// Fails unless the per-class arrays agree in length.
    fn check(&self) -> io::Result<()> {
        check_parallel(
            "root classes",
            &[
                self.class_names.len(),
                self.loader_ids.len(),
                self.cached_class_bytes.len(),
            ],
        )
    }
}

impl WireCodec for RootClassLoaded {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        self.check()?;
        e.write_compressed(|s| {
            s.write_strs(&self.class_names)?;
            s.write_i32s(&self.loader_ids)?;
            s.write_blocks(&self.cached_class_bytes)?;
            s.write_i32s(&self.parent_loader_ids)
        })
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        let msg = d.read_compressed(|s| {
            Ok(Self {
                class_names: s.read_strings()?,
                loader_ids: s.read_i32s()?,
                cached_class_bytes: s.read_blocks()?,
                parent_loader_ids: s.read_i32s()?,
            })
        })?;
        msg.check()?;
        Ok(msg)
    }
}

/// A method was linked in the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodLoaded {
    /// Declaring class.
    pub class_name: String,
    /// Loader of the declaring class.
    pub class_loader_id: i32,
    /// Method name.
    pub method_name: String,
    /// JVM method descriptor.
    pub method_signature: String,
}

impl WireCodec for MethodLoaded {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_str(&self.class_name)?;
        e.write_i32(self.class_loader_id)?;
        e.write_str(&self.method_name)?;
        e.write_str(&self.method_signature)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(Self {
            class_name: d.read_string()?,
            class_loader_id: d.read_i32()?,
            method_name: d.read_string()?,
            method_signature: d.read_string()?,
        })
    }
}

/// A method executed for the first time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInvokedFirstTime {
    /// Agent-assigned method id.
    pub method_id: i32,
}

impl MethodInvokedFirstTime {
    /// Notification for `method_id`.
    pub const fn new(method_id: i32) -> Self {
        Self { method_id }
    }
}

impl WireCodec for MethodInvokedFirstTime {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_i32(self.method_id)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        d.read_i32().map(Self::new)
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Resolve JVM method ids to class/name/signature triples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetMethodNames {
    /// Method ids to resolve.
    pub method_ids: Vec<i32>,
}

impl GetMethodNames {
    /// Query for `method_ids`.
    pub const fn new(method_ids: Vec<i32>) -> Self {
        Self { method_ids }
    }
}

impl WireCodec for GetMethodNames {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_i32s(&self.method_ids)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        d.read_i32s().map(Self::new)
    }
}

/// A class identified by name and loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassQuery {
    /// Class name.
    pub class_name: String,
    /// Initiating loader id.
    pub class_loader_id: i32,
}

impl ClassQuery {
    /// Query for `class_name` as seen by `class_loader_id`.
    pub fn new(class_name: impl Into<String>, class_loader_id: i32) -> Self {
        Self {
            class_name: class_name.into(),
            class_loader_id,
        }
    }
}

impl WireCodec for ClassQuery {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_str(&self.class_name)?;
        e.write_i32(self.class_loader_id)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(Self {
            class_name: d.read_string()?,
            class_loader_id: d.read_i32()?,
        })
    }
}

/// Write a heap dump to a file on the target machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeHeapDump {
    /// Destination path, as seen by the target.
    pub output_file: String,
}

impl TakeHeapDump {
    /// Dump to `output_file`.
    pub fn new(output_file: impl Into<String>) -> Self {
        Self {
            output_file: output_file.into(),
        }
    }
}

impl WireCodec for TakeHeapDump {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_str(&self.output_file)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        d.read_string().map(|output_file| Self { output_file })
    }
}

/// A message the agent wants shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncMessage {
    /// Informational rather than an error.
    pub positive: bool,
    /// Message text.
    pub message: String,
}

impl AsyncMessage {
    /// Builds a message.
    pub fn new(positive: bool, message: impl Into<String>) -> Self {
        Self {
            positive,
            message: message.into(),
        }
    }
}

impl WireCodec for AsyncMessage {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_bool(self.positive)?;
        e.write_str(&self.message)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(Self {
            positive: d.read_bool()?,
            message: d.read_string()?,
        })
    }
}

//! Type code tables.
//!
//! Codes are stable wire identifiers: a retired code is never reused and an
//! existing one is never renumbered. Signals use 1-39, payload-carrying
//! directives 40-99, replies 101 and up, so the three tables never overlap.

use std::fmt;
use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::wire::{Decoder, Encoder, WireCodec, invalid};

/// Declares a closed enumeration with a fixed code per variant.
macro_rules! wire_codes {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident: $repr:ty {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[non_exhaustive]
        $vis enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stable wire code.
            pub const fn code(self) -> $repr {
                match self {
                    $(Self::$variant => $code,)+
                }
            }

            /// Looks up a wire code.
            pub const fn from_code(code: $repr) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            /// Variant name, as shown in logs.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

wire_codes! {
    /// Directives that carry no payload (sent with the simple-directive control byte).
    pub enum Signal: u8 {
        /// Liveness probe; the agent answers with a plain ack.
        CheckConnection = 1,
        /// Let the target application's `main` proceed.
        StartTargetApp = 2,
        /// Agent → controller: the target is shutting down.
        ShutdownInitiated = 3,
        /// Agent → controller: shutdown finished.
        ShutdownCompleted = 4,
        /// Controller → agent: the target may exit now.
        ShutdownOk = 5,
        /// Ask whether any CPU results were collected.
        CpuResultsExist = 6,
        /// Flush collected results to the controller.
        DumpExistingResults = 7,
        /// Flush collected results without stopping collection.
        DumpExistingResultsLive = 8,
        /// Agent → controller: new results can be fetched.
        ResultsAvailable = 9,
        /// Drop all collected data.
        ResetProfilerCollectors = 10,
        /// Fetch code-region timing results.
        GetCodeRegionCpuResults = 11,
        /// Fetch which profiled threads are still alive.
        GetThreadLivenessStatus = 12,
        /// Suspend all application threads.
        SuspendTargetApp = 13,
        /// Resume all application threads.
        ResumeTargetApp = 14,
        /// Terminate the target VM.
        TerminateTargetJvm = 15,
        /// Fetch per-class allocation counters.
        GetObjectAllocationResults = 16,
        /// Run a full garbage collection.
        RunGc = 17,
        /// Fetch target VM properties.
        GetVmProperties = 18,
        /// Fetch calibration data saved on the target machine.
        GetStoredCalibrationData = 19,
        /// Calibrate instrumentation overhead and return the data.
        RunCalibrationAndGetData = 20,
        /// Fetch agent-internal statistics.
        GetInternalStats = 21,
        /// Disable all injected profiling code.
        DeactivateInjectedCode = 22,
        /// Start instrumenting reflectively invoked methods.
        InstrumentReflection = 23,
        /// Stop instrumenting reflectively invoked methods.
        DeinstrumentReflection = 24,
        /// Agent → controller: a long operation is still running.
        StillAlive = 25,
        /// Detach the controller, leaving the target running.
        Detach = 26,
        /// Prepare for detach.
        PrepareDetach = 27,
        /// Fetch memory, thread and GC telemetry.
        GetMonitoredNumbers = 28,
        /// Agent → controller: user requested a snapshot.
        TakeSnapshot = 29,
        /// Fetch a heap histogram.
        GetHeapHistogram = 30,
        /// Fetch a dump of all thread stacks.
        GetThreadDump = 31,
        /// Agent → controller: a class loader was collected.
        ClassLoaderUnloading = 32,
    }
}

wire_codes! {
    /// Directives that carry a payload (sent with the complex-directive control byte).
    pub enum DirectiveKind: u8 {
        /// See [`crate::ChangeableInstrParams`].
        SetChangeableInstrParams = 40,
        /// See [`crate::UnchangeableInstrParams`].
        SetUnchangeableInstrParams = 41,
        /// See [`crate::InitiateProfiling`].
        InitiateProfiling = 42,
        /// See [`crate::InstrumentMethodGroup`].
        InstrumentMethodGroup = 43,
        /// See [`crate::ClassLoaded`].
        ClassLoaded = 44,
        /// See [`crate::RootClassLoaded`].
        RootClassLoaded = 45,
        /// See [`crate::MethodLoaded`].
        MethodLoaded = 46,
        /// See [`crate::MethodInvokedFirstTime`].
        MethodInvokedFirstTime = 47,
        /// See [`crate::EventBufferDumped`].
        EventBufferDumped = 48,
        /// See [`crate::GetMethodNames`].
        GetMethodNamesForJMethodIds = 49,
        /// See [`crate::ClassQuery`].
        GetDefiningClassLoader = 50,
        /// See [`crate::ClassQuery`].
        GetClassId = 51,
        /// See [`crate::TakeHeapDump`].
        TakeHeapDump = 52,
        /// See [`crate::AsyncMessage`].
        AsyncMessage = 53,
    }
}

wire_codes! {
    /// Replies that carry a payload (sent with the complex-reply control byte).
    pub enum ReplyKind: u8 {
        /// See [`crate::CalibrationData`].
        CalibrationData = 101,
        /// Code-region timings.
        CodeRegionCpuResults = 102,
        /// Defining class loader id.
        DefiningLoader = 103,
        /// Timestamp of a results dump.
        DumpResults = 104,
        /// Class id lookup result.
        ClassId = 105,
        /// See [`crate::HeapHistogram`].
        HeapHistogram = 106,
        /// See [`crate::MethodGroup`].
        InstrumentMethodGroup = 107,
        /// See [`crate::InternalStats`].
        InternalStats = 108,
        /// See [`crate::MethodNames`].
        MethodNames = 109,
        /// See [`crate::MonitoredNumbers`].
        MonitoredNumbers = 110,
        /// Per-class allocation counters.
        ObjectAllocationResults = 111,
        /// Per-thread liveness flags.
        ThreadLivenessStatus = 112,
        /// See [`crate::VmProperties`].
        VmProperties = 113,
        /// See [`crate::ThreadDump`].
        ThreadDump = 114,
    }
}

wire_codes! {
    /// Profiling mode requested by the controller.
    pub enum InstrType: i32 {
        /// No instrumentation, no data.
        None = 0,
        /// Time a single code region.
        CodeRegion = 1,
        /// CPU profiling by stack sampling, no instrumentation.
        NoneSampling = 2,
        /// Full method entry/exit instrumentation.
        RecursiveFull = 3,
        /// Method instrumentation with periodic timestamps.
        RecursiveSampled = 4,
        /// Allocation tracking.
        ObjectAllocations = 5,
        /// Allocation and liveness tracking.
        ObjectLiveness = 6,
        /// Periodic live-instance sampling, no instrumentation.
        NoneMemorySampling = 7,
    }
}

wire_codes! {
    /// When instrumented code is injected relative to class loading.
    pub enum InstrScheme: i32 {
        /// Instrument methods on first invocation.
        Lazy = 1,
        /// Instrument whole call graph when a class loads.
        Eager = 2,
        /// Instrument every loaded method.
        Total = 3,
    }
}

wire_codes! {
    /// Thread state as sampled by the agent.
    pub enum ThreadState: i8 {
        /// State not known.
        Unknown = -1,
        /// Not started yet, or already dead.
        Zombie = 0,
        /// Runnable.
        Running = 1,
        /// In `Thread.sleep`.
        Sleeping = 2,
        /// Blocked on a monitor.
        Monitor = 3,
        /// In `Object.wait`.
        Wait = 4,
        /// Parked.
        Park = 5,
    }
}

impl InstrType {
    /// Whether this mode collects memory rather than CPU data.
    pub const fn is_memory(self) -> bool {
        matches!(
            self,
            Self::ObjectAllocations | Self::ObjectLiveness | Self::NoneMemorySampling
        )
    }
}

impl WireCodec for InstrType {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_i32(self.code())
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        let raw = d.read_i32()?;
        Self::from_code(raw).ok_or_else(|| invalid(format!("unknown instrumentation type {raw}")))
    }
}

impl WireCodec for InstrScheme {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_i32(self.code())
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        let raw = d.read_i32()?;
        Self::from_code(raw).ok_or_else(|| invalid(format!("unknown instrumentation scheme {raw}")))
    }
}

/// Thread states travel as one signed byte.
impl WireCodec for ThreadState {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_u8(self.code().to_be_bytes()[0])
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        let raw = i8::from_be_bytes([d.read_u8()?]);
        Self::from_code(raw).ok_or_else(|| invalid(format!("unknown thread state {raw}")))
    }
}

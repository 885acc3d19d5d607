//! Wire protocol between a profiler controller and the agent running inside
//! the profiled process.
//!
//! Messages are [`Directive`]s (requests and event notifications) and
//! [`Reply`]s. Each is framed with a one-byte control code and a one-byte type
//! code, followed by a big-endian payload whose layout is fixed by the type
//! code. See [`channel`] for the framing and [`wire`] for the primitives.

pub mod channel;
mod config;
mod directive;
mod event_buffer;
mod kind;
mod names;
mod reply;
mod telemetry;
pub mod wire;

pub use channel::{Channel, Message, WireReader, WireWriter};
pub use config::{IntegrityPolicy, WireConfig};
pub use directive::{
    AsyncMessage, ChangeableInstrParams, ClassLoaded, ClassQuery, Directive, GetMethodNames,
    InitiateProfiling, InstrumentMethodGroup, MethodGroup, MethodInvokedFirstTime, MethodLoaded,
    RootClassLoaded, TakeHeapDump, UnchangeableInstrParams,
};
pub use event_buffer::EventBufferDumped;
pub use kind::{DirectiveKind, InstrScheme, InstrType, ReplyKind, Signal, ThreadState};
pub use names::{MethodName, MethodNames};
pub use reply::{CalibrationData, InternalStats, Rejected, Reply, ReplyBody, VmProperties};
pub use telemetry::{
    ClassName, GeneralNumbers, HeapHistogram, HistogramRow, MonitoredNumbers, NewThread,
    ThreadDump, ThreadInfo, ThreadsData,
};
pub use wire::{BlockLen, Decoder, Encoder, SENTINEL, WireCodec};

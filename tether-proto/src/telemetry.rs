//! Periodic telemetry replies: monitored numbers, heap histograms and thread dumps.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::kind::ThreadState;
use crate::wire::{Decoder, Encoder, WireCodec, check_parallel, invalid};

/// Discriminator of [`ThreadsData::Sampled`].
const SAMPLED: u8 = 0;
/// Discriminator of [`ThreadsData::Exact`].
const EXACT: u8 = 1;

/// Number of values in [`GeneralNumbers`] on the wire.
const GENERAL_NUMBERS_LEN: usize = 9;

/// Memory, thread, class and GC counters sampled together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredNumbers {
    /// Scalar VM counters.
    pub general: GeneralNumbers,
    /// Thread state samples since the previous request.
    pub threads: ThreadsData,
    /// Threads first seen since the previous request.
    pub new_threads: Vec<NewThread>,
    /// GC start timestamps since the previous request.
    pub gc_starts: Vec<i64>,
    /// GC finish timestamps since the previous request.
    pub gc_finishes: Vec<i64>,
}

/// Scalar VM counters, in wire order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralNumbers {
    /// Free heap, in bytes.
    pub free_memory: i64,
    /// Committed heap, in bytes.
    pub total_memory: i64,
    /// Live application threads.
    pub user_threads: i64,
    /// Live VM and agent threads.
    pub system_threads: i64,
    /// Distinct object ages surviving GC.
    pub surviving_generations: i64,
    /// Share of wall time spent in GC, in per-mille.
    pub gc_time: i64,
    /// Longest GC pause in the last period, in milliseconds.
    pub gc_pause: i64,
    /// Currently loaded classes.
    pub loaded_classes: i64,
    /// Wall-clock time of the sample, in milliseconds since the epoch.
    pub timestamp: i64,
}

impl GeneralNumbers {
    /// Values in wire order.
    const fn to_array(self) -> [i64; GENERAL_NUMBERS_LEN] {
        [
            self.free_memory,
            self.total_memory,
            self.user_threads,
            self.system_threads,
            self.surviving_generations,
            self.gc_time,
            self.gc_pause,
            self.loaded_classes,
            self.timestamp,
        ]
    }

    /// Inverse of [`Self::to_array`].
    const fn from_array(v: [i64; GENERAL_NUMBERS_LEN]) -> Self {
        let [
            free_memory,
            total_memory,
            user_threads,
            system_threads,
            surviving_generations,
            gc_time,
            gc_pause,
            loaded_classes,
            timestamp,
        ] = v;
        Self {
            free_memory,
            total_memory,
            user_threads,
            system_threads,
            surviving_generations,
            gc_time,
            gc_pause,
            loaded_classes,
            timestamp,
        }
    }

    /// Heap in use, in bytes.
    pub const fn used_memory(&self) -> i64 {
        self.total_memory.saturating_sub(self.free_memory)
    }
}

impl WireCodec for GeneralNumbers {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_i64s(&self.to_array())
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        let values = d.read_i64s()?;
        let array: [i64; GENERAL_NUMBERS_LEN] = values.try_into().map_err(|v: Vec<i64>| {
            invalid(format!(
                "expected {GENERAL_NUMBERS_LEN} general numbers, got {}",
                v.len()
            ))
        })?;
        Ok(Self::from_array(array))
    }
}

/// Thread states in one of two layouts, chosen by the agent's sampling mode.
///
/// On the wire a mode byte selects the layout:
///
/// ```text
/// Sampled: [0][i32 threads][i32 samples][threads x i32 id][samples x i64 time][threads*samples x i8 state]
/// Exact:   [1][i32 count][count x (i32 id, i64 time, i8 state)]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ThreadsData {
    /// Every thread's state at every sample time.
    ///
    /// `states` is a row-major matrix with one row per thread and one column
    /// per timestamp.
    Sampled {
        /// Sampled thread ids.
        thread_ids: Vec<i32>,
        /// Sample timestamps.
        timestamps: Vec<i64>,
        /// `thread_ids.len() * timestamps.len()` states.
        states: Vec<ThreadState>,
    },
    /// One entry per observed state change; the three arrays are parallel.
    Exact {
        /// Thread that changed state.
        thread_ids: Vec<i32>,
        /// Time of the change.
        timestamps: Vec<i64>,
        /// New state.
        states: Vec<ThreadState>,
    },
}

impl Default for ThreadsData {
    fn default() -> Self {
        Self::Exact {
            thread_ids: Vec::new(),
            timestamps: Vec::new(),
            states: Vec::new(),
        }
    }
}

impl ThreadsData {
    /// State of thread row `thread` at sample column `sample`. Only defined
    /// for [`ThreadsData::Sampled`].
    pub fn sampled_state(&self, thread: usize, sample: usize) -> Option<ThreadState> {
        match self {
            Self::Sampled {
                thread_ids,
                timestamps,
                states,
            } if thread < thread_ids.len() && sample < timestamps.len() => {
                states.get(thread * timestamps.len() + sample).copied()
            }
            _ => None,
        }
    }

    /// Fails unless the arrays fit the selected layout.
    fn check(&self) -> io::Result<()> {
        match self {
            Self::Sampled {
                thread_ids,
                timestamps,
                states,
            } => {
                let cells = matrix_cells(thread_ids.len(), timestamps.len())?;
                check_parallel("sampled thread states", &[cells, states.len()])
            }
            Self::Exact {
                thread_ids,
                timestamps,
                states,
            } => check_parallel(
                "exact thread states",
                &[thread_ids.len(), timestamps.len(), states.len()],
            ),
        }
    }
}

/// Number of cells in a `threads x samples` state matrix.
fn matrix_cells(threads: usize, samples: usize) -> io::Result<usize> {
    threads
        .checked_mul(samples)
        .ok_or_else(|| invalid("thread sample matrix too large"))
}

impl WireCodec for ThreadsData {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        self.check()?;
        match self {
            Self::Sampled {
                thread_ids,
                timestamps,
                states,
            } => {
                e.write_u8(SAMPLED)?;
                e.write_len(thread_ids.len())?;
                e.write_len(timestamps.len())?;
                e.write_items(thread_ids, |e, id| e.write_i32(*id))?;
                e.write_items(timestamps, |e, t| e.write_i64(*t))?;
                e.write_items(states, |e, s| s.encode(e))
            }
            Self::Exact {
                thread_ids,
                timestamps,
                states,
            } => {
                e.write_u8(EXACT)?;
                e.write_len(thread_ids.len())?;
                let mut records = thread_ids.iter().zip(timestamps).zip(states);
                records.try_for_each(|((id, time), state)| {
                    e.write_i32(*id)?;
                    e.write_i64(*time)?;
                    state.encode(e)
                })
            }
        }
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        match d.read_u8()? {
            SAMPLED => {
                let threads = d.read_len()?;
                let samples = d.read_len()?;
                let cells = matrix_cells(threads, samples)?;
                if cells > d.config().max_elements {
                    return Err(invalid(format!("thread sample matrix of {cells} cells")));
                }
                Ok(Self::Sampled {
                    thread_ids: d.read_items(threads, Decoder::read_i32)?,
                    timestamps: d.read_items(samples, Decoder::read_i64)?,
                    states: d.read_items(cells, ThreadState::decode)?,
                })
            }
            EXACT => {
                let count = d.read_len()?;
                let records = d.read_items(count, |d| {
                    Ok((d.read_i32()?, d.read_i64()?, ThreadState::decode(d)?))
                })?;
                let mut thread_ids = Vec::with_capacity(records.len());
                let mut timestamps = Vec::with_capacity(records.len());
                let mut states = Vec::with_capacity(records.len());
                for (id, time, state) in records {
                    thread_ids.push(id);
                    timestamps.push(time);
                    states.push(state);
                }
                Ok(Self::Exact {
                    thread_ids,
                    timestamps,
                    states,
                })
            }
            other => Err(invalid(format!("unknown thread data mode {other}"))),
        }
    }
}

/// A thread seen for the first time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewThread {
    /// Agent-assigned thread id.
    pub id: i32,
    /// Thread name.
    pub name: String,
    /// Runtime class of the thread object.
    pub class_name: String,
}

impl WireCodec for MonitoredNumbers {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write(&self.general)?;
        e.write(&self.threads)?;
        e.write_seq(&self.new_threads, |e, t| {
            e.write_i32(t.id)?;
            e.write_str(&t.name)?;
            e.write_str(&t.class_name)
        })?;
        e.write_i64s(&self.gc_starts)?;
        e.write_i64s(&self.gc_finishes)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(Self {
            general: d.read()?,
            threads: d.read()?,
            new_threads: d.read_seq(|d| {
                Ok(NewThread {
                    id: d.read_i32()?,
                    name: d.read_string()?,
                    class_name: d.read_string()?,
                })
            })?,
            gc_starts: d.read_i64s()?,
            gc_finishes: d.read_i64s()?,
        })
    }
}

/// Live instances and bytes per class.
///
/// Class names are sent once; later histograms refer to classes by id and
/// carry only the names of classes that appeared since.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapHistogram {
    /// When the histogram was taken, in milliseconds since the epoch.
    pub time_millis: i64,
    /// Ids and names of classes not reported before.
    pub new_classes: Vec<ClassName>,
    /// One row per class with live instances.
    pub rows: Vec<HistogramRow>,
}

/// A class id and its name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassName {
    /// Class id used by [`HistogramRow::class_id`].
    pub id: i32,
    /// Class name.
    pub name: String,
}

/// Live instance count and size of one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramRow {
    /// Class id.
    pub class_id: i32,
    /// Live instances.
    pub instances: i64,
    /// Bytes held by those instances.
    pub bytes: i64,
}

impl HeapHistogram {
    /// Sum of live instances over all rows, saturating instead of overflowing.
    pub fn total_instances(&self) -> i64 {
        self.rows.iter().map(|r| r.instances).fold(0, i64::saturating_add)
    }

    /// Sum of live bytes over all rows, saturating instead of overflowing.
    pub fn total_bytes(&self) -> i64 {
        self.rows.iter().map(|r| r.bytes).fold(0, i64::saturating_add)
    }
}

// On the wire the class table and the rows are columns of parallel arrays.
impl WireCodec for HeapHistogram {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_i64(self.time_millis)?;
        e.write_seq(&self.new_classes, |e, c| e.write_i32(c.id))?;
        e.write_seq(&self.new_classes, |e, c| e.write_str(&c.name))?;
        e.write_seq(&self.rows, |e, r| e.write_i32(r.class_id))?;
        e.write_seq(&self.rows, |e, r| e.write_i64(r.instances))?;
        e.write_seq(&self.rows, |e, r| e.write_i64(r.bytes))
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        let time_millis = d.read_i64()?;
        let ids = d.read_i32s()?;
        let names = d.read_strings()?;
        check_parallel("histogram classes", &[ids.len(), names.len()])?;
        let class_ids = d.read_i32s()?;
        let instances = d.read_i64s()?;
        let bytes = d.read_i64s()?;
        check_parallel(
            "histogram rows",
            &[class_ids.len(), instances.len(), bytes.len()],
        )?;

        Ok(Self {
            time_millis,
            new_classes: ids
                .into_iter()
                .zip(names)
                .map(|(id, name)| ClassName { id, name })
                .collect(),
            rows: class_ids
                .into_iter()
                .zip(instances)
                .zip(bytes)
                .map(|((class_id, instances), bytes)| HistogramRow {
                    class_id,
                    instances,
                    bytes,
                })
                .collect(),
        })
    }
}

/// Stack traces of every live thread, sent as one compressed section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadDump {
    /// When the dump was taken, in milliseconds since the epoch.
    pub time_millis: i64,
    /// One entry per thread.
    pub threads: Vec<ThreadInfo>,
}

/// One thread in a [`ThreadDump`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    /// VM thread id.
    pub id: i64,
    /// Thread name.
    pub name: String,
    /// Daemon thread.
    pub daemon: bool,
    /// State at dump time.
    pub state: ThreadState,
    /// Stack frames, innermost first.
    pub frames: Vec<String>,
    /// Monitor the thread is blocked on or waiting for.
    pub lock: Option<String>,
}

impl WireCodec for ThreadInfo {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_i64(self.id)?;
        e.write_str(&self.name)?;
        e.write_bool(self.daemon)?;
        e.write(&self.state)?;
        e.write_strs(&self.frames)?;
        e.write_opt_str(self.lock.as_deref())
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        Ok(Self {
            id: d.read_i64()?,
            name: d.read_string()?,
            daemon: d.read_bool()?,
            state: d.read()?,
            frames: d.read_strings()?,
            lock: d.read_opt_string()?,
        })
    }
}

impl WireCodec for ThreadDump {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        e.write_compressed(|s| {
            s.write_i64(self.time_millis)?;
            s.write_seq(&self.threads, |s, t| t.encode(s))
        })
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        d.read_compressed(|s| {
            Ok(Self {
                time_millis: s.read_i64()?,
                threads: s.read_seq(|s| s.read())?,
            })
        })
    }
}

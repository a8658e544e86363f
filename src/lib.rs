mod block;
pub mod clock;
pub mod control;
mod error;
mod global;
mod marker;
mod profiler;
mod registry;
pub mod report;
pub mod sink;

pub use crate::block::{BlockKey, DEFAULT_BLOCK_NAME, MAX_NAME_LEN, NameCode};
pub use crate::clock::{ClockSource, ManualClock, ThreadCpuClock, Tid, Timestamp};
pub use crate::control::{Command, DEFAULT_SOCKET_NAME};
pub use crate::error::{BlockNameError, ControlError};
pub use crate::global::*;
pub use crate::profiler::{DEFAULT_SMOOTHING_FACTOR, ListenerMode, Profiler, ProfilerOptions};
pub use crate::report::{AggregateReport, BlockSummary, ThreadProfile};
pub use crate::sink::{LogSink, MemorySink, SpdlogSink};

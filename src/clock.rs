use fxhash::FxHashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Operating-system thread id, as returned by `gettid`.
pub type Tid = i32;

/// A reading of a thread's CPU clock, in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since `begin`.
    ///
    /// Negative when `begin` is later than `self`; skew is reported as-is.
    #[inline(always)]
    pub fn millis_since(self, begin: Timestamp) -> f64 {
        self.0.wrapping_sub(begin.0) as i64 as f64 / 1_000_000.0
    }
}

/// Supplies thread identity and a monotonic per-thread CPU time.
pub trait ClockSource: Send + Sync + 'static {
    fn now(&self) -> Timestamp;

    fn thread_id(&self) -> Tid {
        current_tid()
    }
}

/// Kernel thread id of the calling thread, cached per thread.
#[inline]
pub fn current_tid() -> Tid {
    thread_local! {
        static TID: Tid = unsafe { libc::syscall(libc::SYS_gettid) as Tid };
    }
    TID.with(|tid| *tid)
}

/// Reads `CLOCK_THREAD_CPUTIME_ID`: CPU time consumed by the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadCpuClock;

impl ClockSource for ThreadCpuClock {
    #[inline(always)]
    fn now(&self) -> Timestamp {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let rc = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) };
        debug_assert_eq!(rc, 0, "clock_gettime(CLOCK_THREAD_CPUTIME_ID) failed");
        Timestamp(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64)
    }
}

/// A clock that only moves when told to.
///
/// Every thread sees its own reading, starting at zero, just like a thread CPU clock.
/// `advance` and `set` act on the calling thread's reading only.
#[derive(Debug, Default)]
pub struct ManualClock {
    threads: Mutex<FxHashMap<Tid, u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        let reading = threads.entry(current_tid()).or_default();
        *reading = reading.wrapping_add(by.as_nanos() as u64);
    }

    pub fn set(&self, at: Duration) {
        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        threads.insert(current_tid(), at.as_nanos() as u64);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> Timestamp {
        let threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        Timestamp(threads.get(&current_tid()).copied().unwrap_or(0))
    }
}

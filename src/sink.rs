use spdlog::Level;
use std::sync::{Mutex, PoisonError};

/// Destination for the formatted lines the profiler emits.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, line: &str);
}

/// Forwards every line to the default `spdlog` logger.
#[derive(Debug, Clone, Default)]
pub struct SpdlogSink {
    tag: Option<String>,
}

impl SpdlogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes every line with `tag: `.
    pub fn with_tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
        }
    }
}

impl LogSink for SpdlogSink {
    fn log(&self, level: Level, line: &str) {
        match &self.tag {
            Some(tag) => spdlog::log!(level, "{}: {}", tag, line),
            None => spdlog::log!(level, "{}", line),
        }
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(|(_, line)| line.clone()).collect()
    }

    pub fn count_containing(&self, level: Level, needle: &str) -> usize {
        self.lock()
            .iter()
            .filter(|(l, line)| *l == level && line.contains(needle))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Level, String)>> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, line: &str) {
        self.lock().push((level, line.to_owned()));
    }
}

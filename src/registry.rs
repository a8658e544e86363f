use crate::control::Command;
use crate::marker::{AggregateMarker, InstantMarker, MarkerStore, SmoothMarker};
use crate::report::{AggregateReport, ThreadProfile};
use crate::sink::LogSink;
use spdlog::Level;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// State shared between the timing calls and the control listener.
pub(crate) struct Registry {
    enabled: AtomicBool,
    pub(crate) instant: MarkerStore<InstantMarker>,
    pub(crate) smooth: MarkerStore<SmoothMarker>,
    pub(crate) offline: MarkerStore<AggregateMarker>,
    sink: Arc<dyn LogSink>,
}

impl Registry {
    pub(crate) fn new(sink: Arc<dyn LogSink>, enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            instant: MarkerStore::new(),
            smooth: MarkerStore::new(),
            offline: MarkerStore::new(),
            sink,
        }
    }

    /// Best-effort read; it only gates optional work.
    #[inline(always)]
    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn log(&self, level: Level, line: &str) {
        self.sink.log(level, line);
    }

    /// Applies a command requested from inside this process.
    pub(crate) fn control(&self, command: Command) {
        match command {
            Command::Enable => {
                self.set_enabled(true);
                self.log(Level::Info, "Enabled local instrumentation.");
            }
            Command::Disable => {
                self.set_enabled(false);
                self.log(Level::Info, "Disabled local instrumentation.");
            }
            Command::Print => {
                self.print_offline();
            }
            Command::Clear => {
                self.clear_offline();
            }
        }
    }

    /// Applies a command received over the control socket.
    pub(crate) fn control_remote(&self, command: Command) {
        match command {
            Command::Enable => {
                self.set_enabled(true);
                self.log(Level::Info, "Enabled instrumentation upon remote request.");
            }
            Command::Disable => {
                self.set_enabled(false);
                self.log(Level::Info, "Disabled instrumentation upon remote request.");
            }
            Command::Print => {
                if self.print_offline() {
                    self.log(Level::Info, "Printed offline analyses upon remote request.");
                } else {
                    self.log(
                        Level::Info,
                        "Ignored remote print request: recording is disabled.",
                    );
                }
            }
            Command::Clear => {
                if self.clear_offline() {
                    self.log(
                        Level::Info,
                        "Cleared offline analysis history upon remote request.",
                    );
                } else {
                    self.log(
                        Level::Info,
                        "Ignored remote clear request: recording is disabled.",
                    );
                }
            }
        }
    }

    /// Copies the aggregate store; `None` when nothing has been recorded.
    pub(crate) fn offline_report(&self) -> Option<AggregateReport> {
        let profiles = self.offline.snapshot(|key, marker| ThreadProfile {
            tid: key.tid,
            name: key.name,
            total_ms: marker.total_ms,
            calls: marker.num_samples,
        });
        if profiles.is_empty() {
            return None;
        }
        Some(AggregateReport::from_profiles(profiles))
    }

    /// Logs both tables, or the "nothing recorded" notice. Returns `false` without logging
    /// anything when recording is disabled.
    pub(crate) fn print_offline(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }

        match self.offline_report() {
            None => self.log_nothing_recorded(),
            Some(report) => {
                for line in report.lines() {
                    self.log(Level::Info, &line);
                }
            }
        }
        true
    }

    /// Drops the aggregate history. Returns `false` and keeps it when recording is disabled.
    pub(crate) fn clear_offline(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }

        if self.offline.clear() == 0 {
            self.log_nothing_recorded();
        }
        true
    }

    fn log_nothing_recorded(&self) {
        self.log(
            Level::Info,
            "No offline block found; instrument some code first by wrapping it with start_offline() ... end_offline()",
        );
    }
}

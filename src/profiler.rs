use crate::block::{BlockKey, NameCode};
use crate::clock::{ClockSource, ThreadCpuClock};
use crate::control::{self, Command, ControlListener, DEFAULT_SOCKET_NAME};
use crate::error::ControlError;
use crate::marker::{Marker, MarkerStore};
use crate::registry::Registry;
use crate::report::AggregateReport;
use crate::sink::{LogSink, SpdlogSink};
use spdlog::Level;
use std::sync::Arc;

/// Smoothing factor used by [`Profiler::end_smooth`] unless configured otherwise.
pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.95;

/// Whether timing calls bring up the control listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListenerMode {
    /// Bind the control socket on the first start call.
    #[default]
    Lazy,
    /// Never bind; only [`Profiler::start_listener`] does.
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfilerOptions {
    /// Abstract socket name of the control channel.
    pub socket_name: String,
    /// Whether recording is on before any enable call.
    pub start_enabled: bool,
    /// Weight of history in smoothed timings, in (0, 1).
    pub smoothing_factor: f64,
    pub listener: ListenerMode,
    /// Prefix for every line written by the default sink.
    pub log_tag: Option<String>,
}

impl Default for ProfilerOptions {
    fn default() -> Self {
        Self {
            socket_name: DEFAULT_SOCKET_NAME.to_string(),
            start_enabled: false,
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR,
            listener: ListenerMode::Lazy,
            log_tag: None,
        }
    }
}

fn valid_factor(factor: f64) -> bool {
    factor > 0.0 && factor < 1.0
}

/// Times named blocks of code on the calling thread's CPU clock.
///
/// A block is bracketed by a start and an end call with the same name, on the same thread.
/// There are three independent policies:
/// - instant ([`Profiler::start`]/[`Profiler::end`]): every end logs the elapsed time,
/// - smoothed ([`Profiler::start_smooth`]/[`Profiler::end_smooth`]): every end logs an
///   exponential moving average,
/// - offline ([`Profiler::start_offline`]/[`Profiler::end_offline`]): ends only accumulate,
///   [`Profiler::print_offline`] reports.
///
/// Start calls always record their timestamp; end calls, printing and clearing do nothing
/// while recording is disabled. Calling start again before end restarts the block.
pub struct Profiler<C: ClockSource = ThreadCpuClock> {
    registry: Arc<Registry>,
    listener: ControlListener,
    clock: C,
    listener_mode: ListenerMode,
    smoothing_factor: f64,
}

impl Profiler {
    pub fn new() -> Self {
        Self::with_options(ProfilerOptions::default())
    }

    pub fn with_options(options: ProfilerOptions) -> Self {
        let sink: Arc<dyn LogSink> = match &options.log_tag {
            Some(tag) => Arc::new(SpdlogSink::with_tag(tag.clone())),
            None => Arc::new(SpdlogSink::new()),
        };
        Self::with_parts(options, ThreadCpuClock, sink)
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ClockSource> Profiler<C> {
    pub fn with_parts(options: ProfilerOptions, clock: C, sink: Arc<dyn LogSink>) -> Self {
        let registry = Arc::new(Registry::new(sink, options.start_enabled));

        let smoothing_factor = if valid_factor(options.smoothing_factor) {
            options.smoothing_factor
        } else {
            registry.log(
                Level::Warn,
                &format!(
                    "Smoothing factor {} is outside (0, 1), using {}",
                    options.smoothing_factor, DEFAULT_SMOOTHING_FACTOR
                ),
            );
            DEFAULT_SMOOTHING_FACTOR
        };

        Self {
            registry,
            listener: ControlListener::new(options.socket_name),
            clock,
            listener_mode: options.listener,
            smoothing_factor,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn enable(&self) {
        self.registry.set_enabled(true);
    }

    pub fn disable(&self) {
        self.registry.set_enabled(false);
    }

    pub fn is_enabled(&self) -> bool {
        self.registry.is_enabled()
    }

    /// Applies `command` to this process, logging an acknowledgement for enable/disable.
    pub fn control(&self, command: Command) {
        self.registry.control(command);
    }

    /// Starts an instant block; the matching [`Profiler::end`] logs its duration.
    #[inline]
    pub fn start(&self, name: &str) {
        self.open(&self.registry.instant, name);
    }

    #[inline]
    pub fn end(&self, name: &str) {
        let end = self.clock.now();
        if !self.registry.is_enabled() {
            return;
        }
        let Some(key) = self.key(name) else {
            return;
        };

        match self.registry.instant.take(&key) {
            Some(marker) => {
                let elapsed = end.millis_since(marker.begin().get());
                self.registry.log(
                    Level::Info,
                    &format!("[{}]\t{}\t{:6.2} ms", key.tid, key.name, elapsed),
                );
            }
            None => self.unmatched_end(name, "start"),
        }
    }

    #[inline]
    pub fn start_smooth(&self, name: &str) {
        self.open(&self.registry.smooth, name);
    }

    /// Ends a smoothed block with the configured smoothing factor.
    #[inline]
    pub fn end_smooth(&self, name: &str) {
        self.end_smooth_with(name, self.smoothing_factor);
    }

    /// Ends a smoothed block and logs `factor * previous + (1 - factor) * elapsed`.
    ///
    /// A factor outside (0, 1) is replaced by the configured one.
    #[inline]
    pub fn end_smooth_with(&self, name: &str, factor: f64) {
        let end = self.clock.now();
        if !self.registry.is_enabled() {
            return;
        }
        let Some(key) = self.key(name) else {
            return;
        };

        let factor = if valid_factor(factor) {
            factor
        } else {
            self.registry.log(
                Level::Warn,
                &format!(
                    "Smoothing factor {} is outside (0, 1), using {}",
                    factor, self.smoothing_factor
                ),
            );
            self.smoothing_factor
        };

        let slice = self.registry.smooth.with_marker(&key, |marker| {
            let elapsed = end.millis_since(marker.begin().get());
            marker.update(elapsed, factor)
        });
        match slice {
            Some(slice) => self.registry.log(
                Level::Info,
                &format!("[{}]\t{}\t~{:6.2} ms", key.tid, key.name, slice),
            ),
            None => self.unmatched_end(name, "start_smooth"),
        }
    }

    /// Starts an offline block; ends only accumulate into the offline report.
    #[inline]
    pub fn start_offline(&self, name: &str) {
        self.open(&self.registry.offline, name);
    }

    #[inline]
    pub fn end_offline(&self, name: &str) {
        let end = self.clock.now();
        if !self.registry.is_enabled() {
            return;
        }
        let Some(key) = self.key(name) else {
            return;
        };

        let recorded = self.registry.offline.with_marker(&key, |marker| {
            marker.record(end.millis_since(marker.begin().get()));
        });
        if recorded.is_none() {
            self.unmatched_end(name, "start_offline");
        }
    }

    /// Logs the per-thread and the merged offline tables.
    pub fn print_offline(&self) {
        self.registry.print_offline();
    }

    /// Discards all offline history, including blocks that are still open.
    pub fn clear_offline(&self) {
        self.registry.clear_offline();
    }

    /// The offline history as data, regardless of the enabled flag.
    pub fn offline_report(&self) -> Option<AggregateReport> {
        self.registry.offline_report()
    }

    pub fn enable_external(&self) -> Result<(), ControlError> {
        self.send_external(Command::Enable)
    }

    pub fn disable_external(&self) -> Result<(), ControlError> {
        self.send_external(Command::Disable)
    }

    pub fn print_external(&self) -> Result<(), ControlError> {
        self.send_external(Command::Print)
    }

    pub fn clear_external(&self) -> Result<(), ControlError> {
        self.send_external(Command::Clear)
    }

    /// Sends `command` to whichever process listens on this profiler's socket name.
    pub fn send_external(&self, command: Command) -> Result<(), ControlError> {
        let result = control::send_command(self.listener.socket_name(), command);
        if let Err(err) = &result {
            self.registry.log(Level::Error, &err.to_string());
            if matches!(err, ControlError::Connect { .. }) {
                self.registry.log(
                    Level::Error,
                    "Make sure that an instrumented process is running on this machine; its listener starts on the first start call.",
                );
            }
        }
        result
    }

    /// Binds the control socket now instead of on the first start call.
    pub fn start_listener(&self) -> Result<(), ControlError> {
        self.listener.launch(&self.registry)
    }

    pub fn is_listener_running(&self) -> bool {
        self.listener.is_running()
    }

    /// Stops and joins the control listener. It is not relaunched afterwards.
    pub fn shutdown_listener(&self) -> bool {
        self.listener.shutdown()
    }

    #[inline(always)]
    fn open<M: Marker>(&self, store: &MarkerStore<M>, name: &str) {
        self.ensure_listener();
        let Some(key) = self.key(name) else {
            return;
        };
        let begin = store.open(key);
        // Read the clock after the store lock is released.
        begin.stamp(self.clock.now());
    }

    #[inline(always)]
    fn ensure_listener(&self) {
        if self.listener_mode == ListenerMode::Disabled || self.listener.is_launched() {
            return;
        }
        self.launch_listener();
    }

    #[cold]
    fn launch_listener(&self) {
        match self.listener.launch(&self.registry) {
            Ok(()) => {}
            Err(err @ (ControlError::Bind { .. } | ControlError::InvalidName { .. })) => {
                self.registry.log(Level::Error, &err.to_string());
                self.registry.log(
                    Level::Error,
                    "Make sure that this is the only instrumented process using this control socket.",
                );
                std::process::exit(1);
            }
            Err(err) => self.registry.log(Level::Error, &err.to_string()),
        }
    }

    #[inline]
    fn key(&self, name: &str) -> Option<BlockKey> {
        match NameCode::encode(name) {
            Ok(code) => {
                if NameCode::is_truncated(name) {
                    self.registry.log(
                        Level::Warn,
                        &format!("Block name {} is too long, truncating to 4 characters", name),
                    );
                }
                Some(BlockKey::new(self.clock.thread_id(), code))
            }
            Err(err) => {
                self.registry
                    .log(Level::Warn, &format!("Ignoring block {:?}: {}", name, err));
                None
            }
        }
    }

    #[cold]
    fn unmatched_end(&self, name: &str, start_fn: &str) {
        self.registry.log(
            Level::Warn,
            &format!("Can't find {}, did you call {}(\"{}\")?", name, start_fn, name),
        );
    }
}

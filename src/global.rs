//! Process-wide profiler and free functions forwarding to it.

use crate::error::ControlError;
use crate::profiler::{Profiler, ProfilerOptions};
use std::sync::OnceLock;

static GLOBAL: OnceLock<Profiler> = OnceLock::new();

/// The process-wide profiler, created with default options on first use.
pub fn global() -> &'static Profiler {
    GLOBAL.get_or_init(Profiler::new)
}

/// Creates the process-wide profiler with `options`.
///
/// Returns false, leaving the existing instance untouched, if it was already created.
pub fn install_global(options: ProfilerOptions) -> bool {
    let mut installed = false;
    GLOBAL.get_or_init(|| {
        installed = true;
        Profiler::with_options(options)
    });
    installed
}

pub fn enable() {
    global().enable();
}

pub fn disable() {
    global().disable();
}

pub fn enable_external() -> Result<(), ControlError> {
    global().enable_external()
}

pub fn disable_external() -> Result<(), ControlError> {
    global().disable_external()
}

#[inline]
pub fn start(name: &str) {
    global().start(name);
}

#[inline]
pub fn end(name: &str) {
    global().end(name);
}

#[inline]
pub fn start_smooth(name: &str) {
    global().start_smooth(name);
}

#[inline]
pub fn end_smooth(name: &str) {
    global().end_smooth(name);
}

#[inline]
pub fn end_smooth_with(name: &str, factor: f64) {
    global().end_smooth_with(name, factor);
}

#[inline]
pub fn start_offline(name: &str) {
    global().start_offline(name);
}

#[inline]
pub fn end_offline(name: &str) {
    global().end_offline(name);
}

pub fn print_offline() {
    global().print_offline();
}

pub fn clear_offline() {
    global().clear_offline();
}

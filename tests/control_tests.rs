use blockprof::control::send_command;
use blockprof::{
    Command, ControlError, ListenerMode, ManualClock, MemorySink, Profiler, ProfilerOptions,
};
use spdlog::Level;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn socket_name(test: &str) -> String {
    format!("blockprof_it_{}_{}", std::process::id(), test)
}

fn profiler(test: &str, listener: ListenerMode) -> (Profiler<ManualClock>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let options = ProfilerOptions {
        socket_name: socket_name(test),
        listener,
        ..Default::default()
    };
    (
        Profiler::with_parts(options, ManualClock::new(), sink.clone()),
        sink,
    )
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_listener_starts_lazily() {
    let (profiler, sink) = profiler("lazy", ListenerMode::Lazy);
    assert!(!profiler.is_listener_running());

    profiler.start("A");
    assert!(profiler.is_listener_running());
    profiler.start_offline("B");
    profiler.start_smooth("C");

    assert!(wait_until(|| {
        sink.count_containing(Level::Info, "Command listener running") == 1
    }));
    assert!(profiler.shutdown_listener());
}

#[test]
fn test_disabled_listener_never_binds() {
    let (profiler, _sink) = profiler("never", ListenerMode::Disabled);
    profiler.start("A");
    assert!(!profiler.is_listener_running());
    assert!(matches!(
        profiler.enable_external(),
        Err(ControlError::Connect { .. })
    ));
}

#[test]
fn test_remote_enable_disable() {
    let (profiler, sink) = profiler("toggle", ListenerMode::Lazy);
    profiler.start_offline("A");

    profiler.enable_external().unwrap();
    assert!(wait_until(|| profiler.is_enabled()));
    assert!(wait_until(|| {
        sink.count_containing(Level::Info, "Enabled instrumentation upon remote request") == 1
    }));

    profiler.disable_external().unwrap();
    assert!(wait_until(|| !profiler.is_enabled()));

    profiler.shutdown_listener();
}

#[test]
fn test_remote_print() {
    let (profiler, sink) = profiler("print", ListenerMode::Lazy);
    profiler.enable();

    profiler.start_offline("PRNT");
    profiler.clock().advance(Duration::from_millis(8));
    profiler.end_offline("PRNT");

    send_command(&socket_name("print"), Command::Print).unwrap();
    assert!(wait_until(|| {
        sink.count_containing(Level::Info, "Printed offline analyses upon remote request") == 1
    }));
    assert_eq!(sink.count_containing(Level::Info, "summed across threads"), 1);
    // One per-thread row and one merged row.
    assert_eq!(sink.count_containing(Level::Info, "PRNT    8.00"), 2);

    profiler.shutdown_listener();
}

#[test]
fn test_remote_clear_with_block_in_flight() {
    let (profiler, sink) = profiler("clear", ListenerMode::Lazy);
    profiler.enable();

    profiler.start_offline("DONE");
    profiler.clock().advance(Duration::from_millis(2));
    profiler.end_offline("DONE");
    profiler.start_offline("OPEN");
    profiler.clock().advance(Duration::from_millis(2));

    profiler.clear_external().unwrap();
    assert!(wait_until(|| profiler.offline_report().is_none()));

    // The in-flight block was cleared with the rest; its end finds nothing.
    profiler.end_offline("OPEN");
    assert!(profiler.offline_report().is_none());
    assert_eq!(
        sink.count_containing(Level::Warn, "did you call start_offline(\"OPEN\")"),
        1
    );

    // Recording keeps working afterwards.
    profiler.start_offline("OPEN");
    profiler.clock().advance(Duration::from_millis(3));
    profiler.end_offline("OPEN");
    assert_eq!(profiler.offline_report().unwrap().block("OPEN").unwrap().total_ms, 3.0);

    profiler.shutdown_listener();
}

#[test]
fn test_remote_clear_while_disabled_keeps_history() {
    let (profiler, sink) = profiler("clear_disabled", ListenerMode::Lazy);
    profiler.enable();

    profiler.start_offline("KEEP");
    profiler.clock().advance(Duration::from_millis(4));
    profiler.end_offline("KEEP");
    profiler.disable();

    profiler.clear_external().unwrap();
    assert!(wait_until(|| {
        sink.count_containing(Level::Info, "Ignored remote clear request") == 1
    }));
    assert_eq!(sink.count_containing(Level::Info, "Cleared offline analysis history"), 0);
    assert_eq!(profiler.offline_report().unwrap().block("KEEP").unwrap().calls, 1);

    profiler.print_external().unwrap();
    assert!(wait_until(|| {
        sink.count_containing(Level::Info, "Ignored remote print request") == 1
    }));
    assert_eq!(sink.count_containing(Level::Info, "Printed offline analyses"), 0);

    profiler.shutdown_listener();
}

#[test]
fn test_shutdown_is_final() {
    let (profiler, _sink) = profiler("final", ListenerMode::Lazy);
    profiler.start_listener().unwrap();
    assert!(profiler.is_listener_running());

    assert!(profiler.shutdown_listener());
    assert!(!profiler.is_listener_running());

    profiler.start("A");
    assert!(!profiler.is_listener_running());
    assert!(profiler.enable_external().is_err());
}

#[test]
fn test_print_external_without_listener_logs_hint() {
    let (profiler, sink) = profiler("hint", ListenerMode::Disabled);
    assert!(profiler.print_external().is_err());
    assert_eq!(sink.count_containing(Level::Error, "connect()"), 1);
    assert_eq!(sink.count_containing(Level::Error, "Make sure"), 1);
}

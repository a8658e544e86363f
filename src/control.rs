//! Local control channel.
//!
//! An instrumented process listens on an abstract-namespace Unix socket. Each connection
//! carries exactly one message of two bytes: a command code (`e`, `d`, `p` or `c`) and a
//! zero terminator. Nothing is sent back; the client closes right after writing.

use crate::clock::current_tid;
use crate::error::ControlError;
use crate::registry::Registry;
use spdlog::Level;
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::{SocketAddr, UnixListener, UnixStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// Abstract socket name used when none is configured.
pub const DEFAULT_SOCKET_NAME: &str = "blockprof_control";

const MESSAGE_LEN: usize = 2;
const TERMINATOR: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Enable,
    Disable,
    Print,
    Clear,
}

impl Command {
    pub const fn code(self) -> u8 {
        match self {
            Command::Enable => b'e',
            Command::Disable => b'd',
            Command::Print => b'p',
            Command::Clear => b'c',
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            b'e' => Some(Command::Enable),
            b'd' => Some(Command::Disable),
            b'p' => Some(Command::Print),
            b'c' => Some(Command::Clear),
            _ => None,
        }
    }

    pub const fn message(self) -> [u8; MESSAGE_LEN] {
        [self.code(), TERMINATOR]
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Enable => "enable",
            Command::Disable => "disable",
            Command::Print => "print",
            Command::Clear => "clear",
        };
        f.write_str(name)
    }
}

fn socket_addr(name: &str) -> Result<SocketAddr, ControlError> {
    SocketAddr::from_abstract_name(name.as_bytes()).map_err(|source| ControlError::InvalidName {
        name: name.to_string(),
        source,
    })
}

fn connect(name: &str) -> Result<UnixStream, ControlError> {
    let addr = socket_addr(name)?;
    UnixStream::connect_addr(&addr).map_err(|source| ControlError::Connect {
        name: name.to_string(),
        source,
    })
}

/// Sends `command` to the process listening on `socket_name`.
///
/// Success only means the message was written; the receiver never answers.
pub fn send_command(socket_name: &str, command: Command) -> Result<(), ControlError> {
    let mut stream = connect(socket_name)?;
    stream.write_all(&command.message())?;
    Ok(())
}

/// Reads one message from a freshly accepted connection.
fn read_command(stream: &mut impl Read) -> Result<Command, ControlError> {
    let mut buf = [0u8; MESSAGE_LEN];
    let mut filled = 0;
    while filled < MESSAGE_LEN {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    if filled != MESSAGE_LEN {
        return Err(ControlError::ShortRead { received: filled });
    }
    Command::from_code(buf[0]).ok_or(ControlError::UnknownCommand(buf[0]))
}

fn serve(listener: UnixListener, registry: Arc<Registry>, stop: Arc<AtomicBool>) {
    registry.log(
        Level::Info,
        &format!("[{}]\tCommand listener running...", current_tid()),
    );

    for stream in listener.incoming() {
        if stop.load(Ordering::Acquire) {
            break;
        }

        match stream {
            Ok(mut stream) => match read_command(&mut stream) {
                Ok(command) => registry.control_remote(command),
                Err(err) => registry.log(Level::Warn, &err.to_string()),
            },
            Err(err) => registry.log(Level::Warn, &format!("accept() error: {}", err)),
        }
    }
}

enum ListenerState {
    Idle,
    Running {
        stop: Arc<AtomicBool>,
        thread: JoinHandle<()>,
        registry: Arc<Registry>,
    },
    Stopped,
}

/// Owns the listener thread of one profiler.
///
/// The thread is launched at most once; after [`ControlListener::shutdown`] it is not
/// relaunched.
pub(crate) struct ControlListener {
    socket_name: String,
    launched: AtomicBool,
    state: Mutex<ListenerState>,
}

impl ControlListener {
    pub(crate) fn new(socket_name: impl Into<String>) -> Self {
        Self {
            socket_name: socket_name.into(),
            launched: AtomicBool::new(false),
            state: Mutex::new(ListenerState::Idle),
        }
    }

    pub(crate) fn socket_name(&self) -> &str {
        &self.socket_name
    }

    /// Lock-free check used on the timing path before attempting a launch.
    #[inline(always)]
    pub(crate) fn is_launched(&self) -> bool {
        self.launched.load(Ordering::Acquire)
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            ListenerState::Running { .. }
        )
    }

    /// Binds the socket and spawns the listener thread, unless that already happened.
    pub(crate) fn launch(&self, registry: &Arc<Registry>) -> Result<(), ControlError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have launched while we waited for the lock.
        if self.launched.load(Ordering::Acquire) {
            return Ok(());
        }

        let addr = socket_addr(&self.socket_name)?;
        let listener = UnixListener::bind_addr(&addr).map_err(|source| ControlError::Bind {
            name: self.socket_name.clone(),
            source,
        })?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread = thread::Builder::new()
            .name("blockprof-control".to_string())
            .spawn({
                let registry = registry.clone();
                let stop = stop.clone();
                move || serve(listener, registry, stop)
            })
            .map_err(ControlError::Spawn)?;

        *state = ListenerState::Running {
            stop,
            thread,
            registry: registry.clone(),
        };
        self.launched.store(true, Ordering::Release);
        Ok(())
    }

    /// Stops and joins the listener thread.
    ///
    /// Returns `false` if it was not running, or if it could not be woken up; in the latter
    /// case it keeps running and the error is logged.
    pub(crate) fn shutdown(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.launched.store(true, Ordering::Release);
        match std::mem::replace(&mut *state, ListenerState::Stopped) {
            ListenerState::Running {
                stop,
                thread,
                registry,
            } => {
                stop.store(true, Ordering::Release);
                // Wake the blocking accept; the connection itself carries nothing.
                if let Err(err) = connect(&self.socket_name) {
                    stop.store(false, Ordering::Release);
                    registry.log(
                        Level::Error,
                        &format!("Could not stop the command listener: {}", err),
                    );
                    *state = ListenerState::Running {
                        stop,
                        thread,
                        registry,
                    };
                    return false;
                }
                if thread.join().is_err() {
                    registry.log(Level::Error, "Command listener thread panicked.");
                }
                true
            }
            ListenerState::Idle | ListenerState::Stopped => false,
        }
    }
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use std::time::{Duration, Instant};

    fn unique_name(test: &str) -> String {
        format!("blockprof_unit_{}_{}", std::process::id(), test)
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
    fn test_command_codes() {
        for command in [
            Command::Enable,
            Command::Disable,
            Command::Print,
            Command::Clear,
        ] {
            assert_eq!(Command::from_code(command.code()), Some(command));
            assert_eq!(command.message()[1], 0);
        }
        assert_eq!(Command::Enable.message(), *b"e\0");
        assert_eq!(Command::from_code(b'x'), None);
    }

    #[test]
    fn test_read_command() {
        assert_eq!(read_command(&mut &b"p\0"[..]).unwrap(), Command::Print);
        assert!(matches!(
            read_command(&mut &b"p"[..]),
            Err(ControlError::ShortRead { received: 1 })
        ));
        assert!(matches!(
            read_command(&mut &b"z\0"[..]),
            Err(ControlError::UnknownCommand(b'z'))
        ));
    }

    #[test]
    fn test_send_without_listener_fails() {
        let err = send_command(&unique_name("nobody"), Command::Enable).unwrap_err();
        assert!(matches!(err, ControlError::Connect { .. }));
    }

    #[test]
    fn test_listener_applies_commands() {
        let sink = Arc::new(MemorySink::new());
        let registry = Arc::new(Registry::new(sink.clone(), false));
        let listener = ControlListener::new(unique_name("applies"));

        listener.launch(&registry).unwrap();
        // Second launch is a no-op.
        listener.launch(&registry).unwrap();
        assert!(listener.is_running());

        send_command(listener.socket_name(), Command::Enable).unwrap();
        assert!(wait_until(|| registry.is_enabled()));

        send_command(listener.socket_name(), Command::Disable).unwrap();
        assert!(wait_until(|| !registry.is_enabled()));

        assert!(listener.shutdown());
        assert!(!listener.is_running());
        assert!(!listener.shutdown());
        assert_eq!(sink.count_containing(Level::Info, "Command listener running"), 1);
    }

    #[test]
    fn test_listener_survives_bad_messages() {
        let sink = Arc::new(MemorySink::new());
        let registry = Arc::new(Registry::new(sink.clone(), false));
        let listener = ControlListener::new(unique_name("bad"));
        listener.launch(&registry).unwrap();

        let mut stream = connect(listener.socket_name()).unwrap();
        stream.write_all(b"q\0").unwrap();
        drop(stream);
        let mut stream = connect(listener.socket_name()).unwrap();
        stream.write_all(b"e").unwrap();
        drop(stream);

        assert!(wait_until(|| sink.count_containing(Level::Warn, "") == 2));
        assert_eq!(sink.count_containing(Level::Warn, "unknown command"), 1);
        assert_eq!(sink.count_containing(Level::Warn, "received 1 bytes"), 1);

        send_command(listener.socket_name(), Command::Enable).unwrap();
        assert!(wait_until(|| registry.is_enabled()));
        listener.shutdown();
    }

    #[test]
    fn test_shutdown_keeps_running_when_unreachable() {
        let sink = Arc::new(MemorySink::new());
        let registry = Arc::new(Registry::new(sink.clone(), false));
        let mut listener = ControlListener::new(unique_name("unreachable"));
        listener.launch(&registry).unwrap();
        let bound = std::mem::replace(&mut listener.socket_name, unique_name("elsewhere"));

        assert!(!listener.shutdown());
        assert!(listener.is_running());
        assert_eq!(sink.count_containing(Level::Error, "Could not stop"), 1);

        // Still serving, and the stop flag was not left raised.
        send_command(&bound, Command::Enable).unwrap();
        assert!(wait_until(|| registry.is_enabled()));

        listener.socket_name = bound;
        assert!(listener.shutdown());
        assert!(!listener.is_running());
    }

    #[test]
    fn test_shutdown_reports_panicked_thread() {
        let sink = Arc::new(MemorySink::new());
        let registry = Arc::new(Registry::new(sink.clone(), false));
        let listener = ControlListener::new(unique_name("panicked"));
        let addr = socket_addr(listener.socket_name()).unwrap();
        let _socket = UnixListener::bind_addr(&addr).unwrap();

        let thread = thread::spawn(|| panic!("listener failed"));
        *listener.state.lock().unwrap() = ListenerState::Running {
            stop: Arc::new(AtomicBool::new(false)),
            thread,
            registry: registry.clone(),
        };

        assert!(listener.shutdown());
        assert!(!listener.is_running());
        assert_eq!(sink.count_containing(Level::Error, "thread panicked"), 1);
    }

    #[test]
    fn test_shutdown_frees_socket_name() {
        let registry = Arc::new(Registry::new(Arc::new(MemorySink::new()), false));
        let first = ControlListener::new(unique_name("rebind"));
        first.launch(&registry).unwrap();
        assert!(first.shutdown());

        let second = ControlListener::new(unique_name("rebind"));
        second.launch(&registry).unwrap();
        assert!(second.is_running());
        assert!(second.shutdown());
    }

    #[test]
    fn test_second_bind_fails() {
        let registry = Arc::new(Registry::new(Arc::new(MemorySink::new()), false));
        let first = ControlListener::new(unique_name("twice"));
        first.launch(&registry).unwrap();

        let second = ControlListener::new(unique_name("twice"));
        let err = second.launch(&registry).unwrap_err();
        assert!(matches!(err, ControlError::Bind { .. }));
        assert!(!second.is_running());
        first.shutdown();
    }
}

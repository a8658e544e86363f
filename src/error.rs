use std::io;
use thiserror::Error;

/// Why a block name cannot be encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlockNameError {
    #[error("block name is empty")]
    Empty,
    #[error("block name contains a NUL character")]
    ContainsNul,
    #[error("block name contains a non-ASCII character")]
    NonAscii,
}

/// Failures of the control socket, on either side.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid control socket name '{name}': {source}")]
    InvalidName { name: String, source: io::Error },
    #[error("bind() on control socket '{name}' failed: {source}")]
    Bind { name: String, source: io::Error },
    #[error("connect() to control socket '{name}' failed: {source}")]
    Connect { name: String, source: io::Error },
    #[error("could not spawn the control listener thread: {0}")]
    Spawn(io::Error),
    #[error("control channel i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("received {received} bytes, a command must be exactly 2 bytes")]
    ShortRead { received: usize },
    #[error("unknown command code {0:#04x}")]
    UnknownCommand(u8),
}

//! The fatal-error taxonomy this crate uses to stop the process cleanly.
//!
//! Every kind here ends the process through a single shutdown path
//! (`session::Session::shutdown`); per-connection failures are not part of
//! this taxonomy and are absorbed directly by the mirror loop.

use thiserror::Error;

/// Fatal error kinds, by cause rather than by call site.
#[derive(Debug, Error)]
pub enum RttError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("debugger setup error: {0}")]
    DebuggerSetup(#[from] DebuggerSetupError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("debugger runtime error: {0}")]
    DebuggerRuntime(#[from] DebuggerRuntimeError),

    #[error("socket error: {0}")]
    Socket(#[from] SocketError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Missing required CLI options, unparseable ports, packlen out of range.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required option --{0}")]
    MissingOption(&'static str),

    #[error("invalid value for --{option}: {value}")]
    InvalidValue { option: &'static str, value: String },

    #[error("--packlen must be <= 1024, got {0}")]
    PacklenTooLarge(u32),
}

/// Init/attach/ping failure; symbol not found.
#[derive(Debug, Error)]
pub enum DebuggerSetupError {
    #[error("failed to configure debugger link: {0}")]
    Configure(String),

    #[error("failed to initialize remote API: {0}")]
    Init(String),

    #[error("failed to attach to device: {0}")]
    Attach(String),

    #[error("keepalive (nop/ping) failed: {0}")]
    Keepalive(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),
}

/// Probe receive/transmit failure after retries exhausted.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("receive failed after {retries} retries: {detail}")]
    ReceiveFail { retries: u32, detail: String },

    #[error("transmit failed after {retries} retries: {detail}")]
    TransmitFail { retries: u32, detail: String },
}

/// Script engine enters dialog state; unknown state codes.
#[derive(Debug, Error)]
pub enum DebuggerRuntimeError {
    #[error("debugger is waiting on a dialog box; cannot proceed unattended")]
    Dialog,

    #[error("unknown CPU state code {0}")]
    UnknownCpuState(i32),

    #[error("unknown script engine state code {0}")]
    UnknownScriptState(i32),
}

/// Listen/bind/accept failure on startup is fatal; per-connection errors
/// (see `SessionReset`, which is not part of this enum) reset the session
/// instead of terminating the process.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("bind failed on 0.0.0.0:{port}: {detail}")]
    Bind { port: u16, detail: String },

    #[error("listen failed: {0}")]
    Listen(String),
}

pub type Result<T> = std::result::Result<T, RttError>;

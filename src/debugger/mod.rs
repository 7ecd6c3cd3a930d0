//! The debugger remote API consumed by this crate, modeled as a narrow
//! trait so the core (Target Memory Gateway, Debugger Coordinator) is
//! testable against an in-memory fake instead of a real debugger.
//!
//! Vocabulary and state codes follow the TRACE32 Remote API (`t32.h`):
//! Config/Init/Attach/Nop/Ping/GetSymbol/GetState/GetPracticeState,
//! Stop/Go/Break, Cmd_f, ReadMemory/WriteMemory, Exit.

mod coordinator;
pub mod fake;
pub mod udp;

pub use coordinator::DebuggerCoordinator;

use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a debugger link, held jointly by the Target Memory
/// Gateway and the Debugger Coordinator, in the same split-ownership shape
/// a `Rc<RefCell<_>>` device descriptor is shared between independent
/// `RxToken`/`TxToken` halves.
pub type LinkHandle = Rc<RefCell<dyn DebuggerLink>>;

/// The device class attached to. Only `Icd` is in scope (non-goal: single
/// target class); `T32_DEV_ICE` and friends are named for completeness but
/// unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Icd,
}

/// The memory space operated on. Only `E` (emulation/physical) is used by
/// this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemorySpace {
    Emulation,
}

/// CPU run/break state, as reported by `GetState`. The numeric codes are
/// the bare values used by the original tool; `Other` preserves unknown
/// codes rather than guessing at their meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    Stopped,
    Running,
    Other(i32),
}

impl CpuState {
    pub fn from_code(code: i32) -> CpuState {
        match code {
            2 => CpuState::Stopped,
            3 => CpuState::Running,
            other => CpuState::Other(other),
        }
    }
}

/// Host script-engine state, as reported by `GetPracticeState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    Done,
    Running,
    Dialog,
    Other(i32),
}

impl ScriptState {
    pub fn from_code(code: i32) -> ScriptState {
        match code {
            0 => ScriptState::Done,
            1 => ScriptState::Running,
            2 => ScriptState::Dialog,
            other => ScriptState::Other(other),
        }
    }
}

/// A resolved symbol address, as returned by `GetSymbol`.
#[derive(Debug, Clone, Copy)]
pub struct Symbol {
    pub address: u32,
    #[allow(unused)]
    pub size: u32,
}

/// Failures surfaced by a single `DebuggerLink` call, distinguishing the
/// transient transport errors TMG retries from everything else, which is
/// fatal immediately.
#[derive(Debug, Clone)]
pub enum LinkError {
    ReceiveFail(String),
    TransmitFail(String),
    Other(String),
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::ReceiveFail(d) => write!(f, "receive-fail: {d}"),
            LinkError::TransmitFail(d) => write!(f, "transmit-fail: {d}"),
            LinkError::Other(d) => write!(f, "{d}"),
        }
    }
}

impl std::error::Error for LinkError {}

/// The external debugger remote API this crate consumes:
/// config/connect/keepalive/script/memory-access operations, narrowed to
/// exactly what the Target Memory Gateway and Debugger Coordinator need.
pub trait DebuggerLink {
    fn config(&mut self, key: &str, value: &str) -> Result<(), LinkError>;
    fn init(&mut self) -> Result<(), LinkError>;
    fn attach(&mut self, device: DeviceKind) -> Result<(), LinkError>;
    fn nop(&mut self) -> Result<(), LinkError>;
    fn ping(&mut self) -> Result<(), LinkError>;
    fn get_symbol(&mut self, name: &str) -> Result<Symbol, LinkError>;
    fn get_state(&mut self) -> Result<CpuState, LinkError>;
    fn get_practice_state(&mut self) -> Result<ScriptState, LinkError>;
    fn stop(&mut self) -> Result<(), LinkError>;
    fn go(&mut self) -> Result<(), LinkError>;
    fn brk(&mut self) -> Result<(), LinkError>;
    fn cmd(&mut self, command: &str) -> Result<(), LinkError>;
    fn read_memory(&mut self, addr: u32, space: MemorySpace, dst: &mut [u8]) -> Result<(), LinkError>;
    fn write_memory(&mut self, addr: u32, space: MemorySpace, src: &[u8]) -> Result<(), LinkError>;
    fn exit(&mut self) -> Result<(), LinkError>;
}

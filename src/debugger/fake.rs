//! An in-memory `DebuggerLink` backing the unit/integration tests and the
//! `demos/` loopback binary. Models target RAM as a `HashMap<u32, u8>` and
//! a symbol table, with no real transport.

use super::{CpuState, DebuggerLink, DeviceKind, LinkError, MemorySpace, ScriptState, Symbol};
use std::collections::HashMap;

pub struct FakeLink {
    mem: HashMap<u32, u8>,
    symbols: HashMap<String, Symbol>,
    cpu_state: CpuState,
    script_state: ScriptState,
    reads_remaining_before_success: u32,
}

impl FakeLink {
    pub fn new() -> Self {
        FakeLink {
            mem: HashMap::new(),
            symbols: HashMap::new(),
            cpu_state: CpuState::Running,
            script_state: ScriptState::Done,
            reads_remaining_before_success: 0,
        }
    }

    /// Makes the next `n` `read_memory` calls fail with `ReceiveFail`,
    /// exercising the Target Memory Gateway's retry policy.
    pub fn failing_reads(mut self, n: u32) -> Self {
        self.reads_remaining_before_success = n;
        self
    }

    pub fn define_symbol(&mut self, name: &str, address: u32, size: u32) {
        self.symbols
            .insert(name.to_string(), Symbol { address, size });
    }

    pub fn set_cpu_state(&mut self, state: CpuState) {
        self.cpu_state = state;
    }

    pub fn set_script_state(&mut self, state: ScriptState) {
        self.script_state = state;
    }
}

impl Default for FakeLink {
    fn default() -> Self {
        Self::new()
    }
}

impl DebuggerLink for FakeLink {
    fn config(&mut self, _key: &str, _value: &str) -> Result<(), LinkError> {
        Ok(())
    }

    fn init(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn attach(&mut self, _device: DeviceKind) -> Result<(), LinkError> {
        Ok(())
    }

    fn nop(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn ping(&mut self) -> Result<(), LinkError> {
        Ok(())
    }

    fn get_symbol(&mut self, name: &str) -> Result<Symbol, LinkError> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| LinkError::Other(format!("symbol not found: {name}")))
    }

    fn get_state(&mut self) -> Result<CpuState, LinkError> {
        Ok(self.cpu_state)
    }

    fn get_practice_state(&mut self) -> Result<ScriptState, LinkError> {
        Ok(self.script_state)
    }

    fn stop(&mut self) -> Result<(), LinkError> {
        self.cpu_state = CpuState::Stopped;
        Ok(())
    }

    fn go(&mut self) -> Result<(), LinkError> {
        self.cpu_state = CpuState::Running;
        Ok(())
    }

    fn brk(&mut self) -> Result<(), LinkError> {
        self.cpu_state = CpuState::Stopped;
        Ok(())
    }

    fn cmd(&mut self, _command: &str) -> Result<(), LinkError> {
        // Triggering a script run does not itself resolve the script
        // state; callers poll `get_practice_state` for that, matching the
        // real asynchronous script engine.
        Ok(())
    }

    fn read_memory(&mut self, addr: u32, _space: MemorySpace, dst: &mut [u8]) -> Result<(), LinkError> {
        if self.reads_remaining_before_success > 0 {
            self.reads_remaining_before_success -= 1;
            return Err(LinkError::ReceiveFail("fake transient failure".into()));
        }
        for (i, b) in dst.iter_mut().enumerate() {
            *b = *self.mem.get(&(addr + i as u32)).unwrap_or(&0);
        }
        Ok(())
    }

    fn write_memory(&mut self, addr: u32, _space: MemorySpace, src: &[u8]) -> Result<(), LinkError> {
        for (i, b) in src.iter().enumerate() {
            self.mem.insert(addr + i as u32, *b);
        }
        Ok(())
    }

    fn exit(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

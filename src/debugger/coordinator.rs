//! Debugger Coordinator: brings the target into a known state and resolves
//! the RTT control-block address before the mirror loop starts.

use super::{CpuState, DebuggerLink, DeviceKind, LinkHandle, ScriptState};
use crate::config::Config;
use crate::error::{DebuggerRuntimeError, DebuggerSetupError, RttError};
use crate::tmg::with_retries;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

/// Delay between script-engine state polls.
const SCRIPT_POLL_DELAY: Duration = Duration::from_secs(2);

const RTT_SYMBOL: &str = "_SEGGER_RTT";

pub struct DebuggerCoordinator {
    link: LinkHandle,
}

impl DebuggerCoordinator {
    pub fn new(link: LinkHandle) -> Self {
        DebuggerCoordinator { link }
    }

    /// Runs the full startup sequence and returns the resolved RCB base
    /// address.
    pub fn start(&self, cfg: &Config) -> Result<u32, RttError> {
        self.configure_transport(cfg)?;
        self.connect()?;
        self.normalize_state(cfg)?;
        self.keepalive()?;
        if let Some(script) = &cfg.cmm {
            self.run_script(script)?;
        }
        self.resolve_rcb_address()
    }

    fn configure_transport(&self, cfg: &Config) -> Result<(), RttError> {
        let mut link = self.link.borrow_mut();
        link.config("NODE", &cfg.node)
            .map_err(|e| DebuggerSetupError::Configure(e.to_string()))?;
        link.config("PORT", &cfg.tport.to_string())
            .map_err(|e| DebuggerSetupError::Configure(e.to_string()))?;
        if let Some(packlen) = cfg.packlen {
            link.config("PACKLEN", &packlen.to_string())
                .map_err(|e| DebuggerSetupError::Configure(e.to_string()))?;
        }
        Ok(())
    }

    fn connect(&self) -> Result<(), RttError> {
        let mut link = self.link.borrow_mut();
        link.init().map_err(|e| DebuggerSetupError::Init(e.to_string()))?;
        link.attach(DeviceKind::Icd)
            .map_err(|e| DebuggerSetupError::Attach(e.to_string()))?;
        Ok(())
    }

    /// Step 3: if a script path is provided, ensure the CPU is stopped
    /// (breaking it if running); otherwise ensure it is running (going if
    /// stopped). Queries are retried per the Target Memory Gateway's
    /// policy.
    fn normalize_state(&self, cfg: &Config) -> Result<(), RttError> {
        let state = with_retries(|| self.link.borrow_mut().get_state())?;
        let want_stopped = cfg.cmm.is_some();
        match (want_stopped, state) {
            (true, CpuState::Running) => {
                self.link.borrow_mut().brk().map_err(|e| {
                    RttError::DebuggerSetup(DebuggerSetupError::Init(e.to_string()))
                })?;
            }
            (false, CpuState::Stopped) => {
                self.link.borrow_mut().go().map_err(|e| {
                    RttError::DebuggerSetup(DebuggerSetupError::Init(e.to_string()))
                })?;
            }
            (_, CpuState::Other(code)) => {
                return Err(RttError::DebuggerRuntime(
                    DebuggerRuntimeError::UnknownCpuState(code),
                ))
            }
            _ => {}
        }
        Ok(())
    }

    fn keepalive(&self) -> Result<(), RttError> {
        let mut link = self.link.borrow_mut();
        link.nop().map_err(|e| DebuggerSetupError::Keepalive(e.to_string()))?;
        link.ping().map_err(|e| DebuggerSetupError::Keepalive(e.to_string()))?;
        Ok(())
    }

    /// Step 5: runs `script` and polls the script-engine state until
    /// `Done`, fixed `SCRIPT_POLL_DELAY` between polls. A `Dialog` state
    /// is fatal at any point during the wait.
    fn run_script(&self, script: &str) -> Result<(), RttError> {
        let absolute = Path::new(script)
            .canonicalize()
            .map_err(|e| DebuggerSetupError::Init(format!("cannot resolve {script}: {e}")))?;
        let absolute = absolute.to_string_lossy().into_owned();

        self.link
            .borrow_mut()
            .cmd(&absolute)
            .map_err(|e| DebuggerSetupError::Init(e.to_string()))?;

        loop {
            let state = with_retries(|| self.link.borrow_mut().get_practice_state())?;
            match state {
                ScriptState::Done => return Ok(()),
                ScriptState::Dialog => return Err(RttError::DebuggerRuntime(DebuggerRuntimeError::Dialog)),
                ScriptState::Other(code) => {
                    return Err(RttError::DebuggerRuntime(
                        DebuggerRuntimeError::UnknownScriptState(code),
                    ))
                }
                ScriptState::Running => sleep(SCRIPT_POLL_DELAY),
            }
        }
    }

    /// Step 6: resolves `_SEGGER_RTT` to the RCB base address.
    fn resolve_rcb_address(&self) -> Result<u32, RttError> {
        let symbol = self
            .link
            .borrow_mut()
            .get_symbol(RTT_SYMBOL)
            .map_err(|e| DebuggerSetupError::SymbolNotFound(e.to_string()))?;
        Ok(symbol.address)
    }

    /// Returns the target to a canonical state and detaches. Errors are
    /// logged by the caller but never block exit.
    pub fn shutdown(&self) {
        let mut link = self.link.borrow_mut();
        match link.get_practice_state() {
            Ok(ScriptState::Running) => {
                if let Err(e) = link.cmd("STOP") {
                    log::warn!("debugger shutdown: failed to stop script engine: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => log::warn!("debugger shutdown: get_practice_state failed: {e}"),
        }
        match link.get_state() {
            Ok(CpuState::Running) => {
                if let Err(e) = link.brk() {
                    log::warn!("debugger shutdown: failed to break CPU: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => log::warn!("debugger shutdown: get_state failed: {e}"),
        }
        if let Err(e) = link.exit() {
            log::warn!("debugger shutdown: exit failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debugger::fake::FakeLink;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn coordinator_with(link: FakeLink) -> (DebuggerCoordinator, LinkHandle) {
        let handle: LinkHandle = Rc::new(RefCell::new(link));
        (DebuggerCoordinator::new(handle.clone()), handle)
    }

    fn base_config() -> Config {
        Config {
            node: "localhost".into(),
            tport: 20000,
            lport: 23,
            packlen: None,
            cmm: None,
            record: None,
        }
    }

    #[test]
    fn resolves_symbol_after_full_startup() {
        let mut fake = FakeLink::new();
        fake.define_symbol("_SEGGER_RTT", 0x2000_1000, 0x40);
        fake.set_cpu_state(CpuState::Stopped);
        let (dc, _link) = coordinator_with(fake);
        let base = dc.start(&base_config()).unwrap();
        assert_eq!(base, 0x2000_1000);
    }

    #[test]
    fn missing_symbol_is_fatal() {
        let fake = FakeLink::new();
        let (dc, _link) = coordinator_with(fake);
        let err = dc.start(&base_config()).unwrap_err();
        assert!(matches!(err, RttError::DebuggerSetup(DebuggerSetupError::SymbolNotFound(_))));
    }

    #[test]
    fn dialog_state_during_script_run_is_fatal() {
        let mut fake = FakeLink::new();
        fake.define_symbol("_SEGGER_RTT", 0x1000, 0x10);
        fake.set_script_state(ScriptState::Dialog);
        let (dc, _link) = coordinator_with(fake);
        let mut cfg = base_config();
        cfg.cmm = Some(".".into());
        let err = dc.start(&cfg).unwrap_err();
        assert!(matches!(err, RttError::DebuggerRuntime(DebuggerRuntimeError::Dialog)));
    }
}

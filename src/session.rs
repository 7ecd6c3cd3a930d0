//! Session State: gathers every piece of process-wide mutable state —
//! resolved RCB address, listening socket, at most one accepted peer,
//! scratch buffer, debugger link, transcript, and shutdown signal — into
//! one value constructed at startup, in place of scattered globals.

use crate::config::Config;
use crate::debugger::udp::UdpLink;
use crate::debugger::{DebuggerCoordinator, LinkHandle};
use crate::error::RttError;
use crate::rcbm;
use crate::signal::ShutdownSignal;
use crate::socket::{self, Listener, Peer};
use crate::tmg::TargetMemoryGateway;
use crate::transcript::Transcript;
use anyhow::Context;
use std::cell::RefCell;
use std::rc::Rc;

/// Size of the bidirectional scratch buffer.
pub const SCRATCH_LEN: usize = 2048;

pub struct Session {
    pub tmg: TargetMemoryGateway,
    pub dc: DebuggerCoordinator,
    pub up_addr: u32,
    pub down_addr: u32,
    pub listener: Listener,
    pub peer: Option<Peer>,
    pub transcript: Option<Transcript>,
    pub shutdown: ShutdownSignal,
    pub scratch: [u8; SCRATCH_LEN],
}

impl Session {
    /// Runs Debugger Coordinator startup, resolves channel 0's up/down ring
    /// addresses, binds the listening socket, and installs the shutdown
    /// signal handling, in that order.
    pub fn start(cfg: &Config) -> Result<Session, RttError> {
        let mut link = UdpLink::connect(&cfg.node, cfg.tport)
            .map_err(|e| anyhow::anyhow!(e.to_string()))
            .with_context(|| context!())
            .map_err(|e| crate::error::DebuggerSetupError::Init(e.to_string()))?;
        if let Some(packlen) = cfg.packlen {
            link.set_packlen(packlen as usize);
        }
        let link: LinkHandle = Rc::new(RefCell::new(link));

        let dc = DebuggerCoordinator::new(link.clone());
        let base = dc.start(cfg)?;
        let tmg = TargetMemoryGateway::new(link);

        let max_up = tmg.read_u32(rcbm::addr_max_up(base))?;
        let up_addr = rcbm::addr_aup(base, 0);
        let down_addr = rcbm::addr_adown(base, max_up, 0);

        let listener = Listener::bind(cfg.lport)
            .map_err(|e| crate::error::SocketError::Bind { port: cfg.lport, detail: e.to_string() })?;

        let transcript = match &cfg.record {
            Some(path) => Some(Transcript::open(path)?),
            None => None,
        };

        let shutdown = ShutdownSignal::install()?;

        Ok(Session {
            tmg,
            dc,
            up_addr,
            down_addr,
            listener,
            peer: None,
            transcript,
            shutdown,
            scratch: [0u8; SCRATCH_LEN],
        })
    }

    /// Drops the current peer, if any.
    pub fn drop_peer(&mut self) {
        if let Some(peer) = self.peer.take() {
            peer.close();
        }
    }

    /// Returns the target to a known state and detaches. Errors are
    /// logged, never propagated.
    pub fn shutdown(&mut self) {
        self.drop_peer();
        self.dc.shutdown();
    }

    pub fn note(&mut self, line: &str) {
        log::error!("{line}");
        if let Some(t) = &mut self.transcript {
            if let Err(e) = t.write_note(line) {
                log::warn!("failed to write transcript note: {e}");
            }
        }
    }

    /// Filters and appends forwarded bytes to the transcript, if one is
    /// open.
    pub fn mirror_to_log(&mut self, bytes: &[u8]) {
        if let Some(t) = &mut self.transcript {
            if let Err(e) = t.write_forwarded(bytes) {
                log::warn!("failed to write transcript: {e}");
            }
        }
    }

    pub fn telnet_negotiate(&mut self) -> std::io::Result<()> {
        if let Some(peer) = &mut self.peer {
            socket::negotiate(peer)
        } else {
            Ok(())
        }
    }
}

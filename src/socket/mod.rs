//! Telnet-TCP Endpoint: a single-listener, single-accepted-connection TCP
//! server with non-blocking readiness checks, keepalive, and initial
//! Telnet option negotiation.
//!
//! A platform split built directly on `libc` (`unix`) is kept as the single
//! socket-abstraction boundary: everything outside this module talks to
//! `Listener`/`Peer`, and `unix` is the only backend implemented (non-goal:
//! this crate targets Linux hosts only).

mod unix;

pub use unix::{Listener, Peer, Readiness};

/// The 9-byte Telnet preamble sent immediately after accept: WILL ECHO,
/// WILL SUPPRESS-GO-AHEAD, WON'T WINDOW-SIZE.
pub const TELNET_PREAMBLE: [u8; 9] = [0xFF, 0xFB, 0x01, 0xFF, 0xFB, 0x03, 0xFF, 0xFC, 0x1F];

/// Bytes of the peer's negotiation reply consumed and discarded. Read with
/// no timeout handling; a peer that never replies stalls this call.
pub const TELNET_REPLY_DISCARD_LEN: usize = 6;

/// Sends the Telnet preamble and best-effort-discards the peer's reply.
/// Called once, immediately after `Listener::accept`. No further Telnet
/// processing is performed afterwards; raw bytes are forwarded in both
/// directions.
pub fn negotiate(peer: &mut Peer) -> std::io::Result<()> {
    peer.send(&TELNET_PREAMBLE)?;
    let mut discard = [0u8; TELNET_REPLY_DISCARD_LEN];
    let _ = peer.recv(&mut discard);
    Ok(())
}

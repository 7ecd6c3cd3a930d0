//! Mirror Loop: the single cooperative thread coupling the Ring Transfer
//! Engine to the Telnet-TCP Endpoint, with idle-delay and send-threshold
//! batching and signal-driven shutdown.

use crate::rcbm;
use crate::rte;
use crate::session::Session;
use crate::socket::Readiness;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Accept-probe timeout and the idle-delay budget of the threshold wait.
pub const RTT_IDLE_DELAY: Duration = Duration::from_millis(20);
/// Bytes of up-ring content that end the threshold wait early
/// (`RTT_SEND_THRESHOLD`).
pub const RTT_SEND_THRESHOLD: u32 = 512;
/// Poll interval inside the threshold wait (`RTT_COMM_POLL_INTERVAL`).
pub const RTT_COMM_POLL_INTERVAL: Duration = Duration::from_millis(2);

enum State {
    NoPeer,
    Peered,
}

/// Runs the mirror loop until a trapped signal arrives, then returns its
/// number as the process exit code.
pub fn run(session: &mut Session) -> i32 {
    let mut state = State::NoPeer;
    loop {
        if let Some(signal) = session.shutdown.poll() {
            session.shutdown();
            return signal;
        }

        state = match state {
            State::NoPeer => step_no_peer(session),
            State::Peered => step_peered(session),
        };
    }
}

fn step_no_peer(session: &mut Session) -> State {
    match session.listener.accept_ready(RTT_IDLE_DELAY) {
        Ok(Readiness::Timeout) => State::NoPeer,
        Err(e) => {
            log::warn!("accept probe failed: {e}");
            sleep(Duration::from_millis(1000));
            State::NoPeer
        }
        Ok(Readiness::Ready) => match session.listener.accept() {
            Ok(peer) => {
                if !peer.is_ready().unwrap_or(false) {
                    sleep(Duration::from_millis(1000));
                    return State::NoPeer;
                }
                session.peer = Some(peer);
                if let Err(e) = session.telnet_negotiate() {
                    log::warn!("telnet negotiation failed: {e}");
                    session.drop_peer();
                    return State::NoPeer;
                }
                log::info!("accepted a peer connection");
                State::Peered
            }
            Err(e) => {
                log::warn!("accept failed: {e}");
                sleep(Duration::from_millis(1000));
                State::NoPeer
            }
        },
    }
}

fn step_peered(session: &mut Session) -> State {
    let writable = match session
        .peer
        .as_ref()
        .unwrap()
        .writable(Duration::from_millis(10))
    {
        Ok(Readiness::Ready) => true,
        Ok(Readiness::Timeout) => false,
        Err(_) => {
            session.drop_peer();
            return State::NoPeer;
        }
    };
    if !writable {
        return State::Peered;
    }

    wait_for_threshold(session);

    let readable = session
        .peer
        .as_ref()
        .unwrap()
        .readable(Duration::from_millis(0))
        .unwrap_or(Readiness::Timeout);
    if readable == Readiness::Ready {
        let n = session.peer.as_mut().unwrap().recv(&mut session.scratch);
        match n {
            Ok(0) | Err(_) => {
                session.drop_peer();
                return State::NoPeer;
            }
            Ok(n) => {
                let chunk = session.scratch[..n].to_vec();
                match rte::write_down(&session.tmg, session.down_addr, &chunk) {
                    Ok(written) => session.mirror_to_log(&chunk[..written]),
                    Err(e) => return fatal(session, &format!("write_down: {e}")),
                }
            }
        }
    }

    match rte::read_up(&session.tmg, session.up_addr, session.scratch.len()) {
        Ok(bytes) if !bytes.is_empty() => match session.peer.as_mut().unwrap().send(&bytes) {
            Ok(k) => {
                session.mirror_to_log(&bytes[..k]);
                if k != bytes.len() {
                    session.drop_peer();
                    return State::NoPeer;
                }
            }
            Err(_) => {
                session.drop_peer();
                return State::NoPeer;
            }
        },
        Ok(_) => {}
        Err(e) => return fatal(session, &format!("read_up: {e}")),
    }

    sleep(Duration::from_millis(1));
    State::Peered
}

/// A probe failure inside the Ring Transfer Engine is fatal for the whole
/// process, not just the current peer.
fn fatal(session: &mut Session, detail: &str) -> State {
    session.note(&format!("fatal transport error: {detail}"));
    session.shutdown();
    std::process::exit(1);
}

/// Polls `bytes_in_up_ring` at `RTT_COMM_POLL_INTERVAL` until it reaches
/// `RTT_SEND_THRESHOLD` or the `RTT_IDLE_DELAY` budget elapses, whichever
/// comes first.
fn wait_for_threshold(session: &Session) {
    let deadline = Instant::now() + RTT_IDLE_DELAY;
    loop {
        let used = bytes_in_up_ring(session);
        if used >= RTT_SEND_THRESHOLD || Instant::now() >= deadline {
            return;
        }
        sleep(RTT_COMM_POLL_INTERVAL);
    }
}

fn bytes_in_up_ring(session: &Session) -> u32 {
    match rcbm::fetch_descriptor(&session.tmg, session.up_addr) {
        Ok(desc) => rte::bytes_used(desc.rd_off, desc.wr_off, desc.size_of_buffer),
        Err(_) => 0,
    }
}

//! Standalone demo: exercises the Ring Transfer Engine and the Telnet-TCP
//! Endpoint against an in-memory debugger fake, without a real debugger or
//! target attached. The "firmware" is simulated by copying whatever lands
//! in the down ring straight into the up ring after each iteration, so a
//! Telnet client connected to this demo sees its own input echoed back.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::time::Duration;

use telnet_rtt::debugger::fake::FakeLink;
use telnet_rtt::debugger::LinkHandle;
use telnet_rtt::rcbm;
use telnet_rtt::rte;
use telnet_rtt::socket::{self, Listener, Readiness};
use telnet_rtt::tmg::TargetMemoryGateway;

const RING_SIZE: u32 = 256;
const DESC_UP: u32 = 0x0000_1000;
const BUF_UP: u32 = 0x0000_2000;
const DESC_DOWN: u32 = 0x0000_3000;
const BUF_DOWN: u32 = 0x0000_4000;

fn install_ring(tmg: &TargetMemoryGateway, desc: u32, buf: u32, flags: u32) {
    tmg.write_u32(rcbm::addr_pbuffer(desc), buf).unwrap();
    tmg.write_u32(rcbm::addr_size_of_buffer(desc), RING_SIZE).unwrap();
    tmg.write_u32(rcbm::addr_wr_off(desc), 0).unwrap();
    tmg.write_u32(rcbm::addr_rd_off(desc), 0).unwrap();
    tmg.write_u32(rcbm::addr_flags(desc), flags).unwrap();
}

fn main() {
    env_logger::init();
    let mut opts = getopts::Options::new();
    opts.optopt("l", "lport", "local TCP listen port", "PORT");
    let args: Vec<String> = std::env::args().collect();
    let matches = opts.parse(&args[1..]).expect("usage: loopback [-l PORT]");
    let lport: u16 = matches
        .opt_str("lport")
        .unwrap_or_else(|| "2332".to_string())
        .parse()
        .expect("invalid --lport");

    let link: LinkHandle = Rc::new(RefCell::new(FakeLink::new()));
    let tmg = TargetMemoryGateway::new(link);
    // Block mode on the down ring so a slow consumer never silently drops
    // input; Skip (0) on the up ring is irrelevant since only this demo's
    // own firmware simulation writes it.
    install_ring(&tmg, DESC_UP, BUF_UP, 0);
    install_ring(&tmg, DESC_DOWN, BUF_DOWN, 2);

    let listener = Listener::bind(lport).expect("bind local listener");
    println!("loopback demo listening on 127.0.0.1:{lport}");

    loop {
        if listener.accept_ready(Duration::from_millis(20)).unwrap() != Readiness::Ready {
            continue;
        }
        let mut peer = match listener.accept() {
            Ok(p) => p,
            Err(_) => continue,
        };
        if socket::negotiate(&mut peer).is_err() {
            continue;
        }
        println!("peer connected");

        let mut scratch = [0u8; 2048];
        'conn: loop {
            if peer.readable(Duration::from_millis(20)).unwrap_or(Readiness::Timeout) == Readiness::Ready {
                match peer.recv(&mut scratch) {
                    Ok(0) | Err(_) => break 'conn,
                    Ok(n) => {
                        let written = rte::write_down(&tmg, DESC_DOWN, &scratch[..n]).unwrap();
                        // Firmware simulation: whatever the down ring just
                        // received is immediately echoed into the up ring.
                        if written > 0 {
                            rte::write_down(&tmg, DESC_UP, &scratch[..written]).ok();
                        }
                    }
                }
            }
            match rte::read_up(&tmg, DESC_UP, scratch.len()) {
                Ok(bytes) if !bytes.is_empty() => {
                    if peer.send(&bytes).is_err() {
                        break 'conn;
                    }
                    let _ = std::io::stdout().flush();
                }
                _ => {}
            }
        }
        println!("peer disconnected");
    }
}

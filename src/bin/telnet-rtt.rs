//! Entry point: CLI parsing, logger init, session startup, and the Mirror
//! Loop.

use telnet_rtt::config::{self, Action};
use telnet_rtt::mirror;
use telnet_rtt::session::Session;

fn main() {
    env_logger::init();

    let argv: Vec<String> = std::env::args().collect();
    let action = match config::parse(&argv) {
        Ok(action) => action,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let cfg = match action {
        Action::Help(usage) => {
            println!("{usage}");
            std::process::exit(0);
        }
        Action::Version(line) => {
            println!("{line}");
            std::process::exit(0);
        }
        Action::Run(cfg) => cfg,
    };

    let mut session = match Session::start(&cfg) {
        Ok(session) => session,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let signal = mirror::run(&mut session);
    std::process::exit(signal);
}

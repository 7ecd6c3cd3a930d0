//! Command-line parsing.
//!
//! Mirrors the option table of the original `telnet-rtt` utility, built
//! with `getopts`.

use crate::error::ConfigError;
use getopts::Options;

const PACKLEN_MAX: u32 = 1024;

/// Resolved, validated configuration for one run of `telnet-rtt`.
#[derive(Debug, Clone)]
pub struct Config {
    pub node: String,
    pub tport: u16,
    pub lport: u16,
    pub packlen: Option<u32>,
    pub cmm: Option<String>,
    pub record: Option<String>,
}

/// What `parse` decided to do with the process, short of running the
/// mirror loop.
pub enum Action {
    /// `--help` or no usable arguments: print usage and exit 0.
    Help(String),
    /// `--version`: print name and version and exit 0.
    Version(String),
    /// Proceed to start the session with this configuration.
    Run(Config),
}

fn options() -> Options {
    let mut opts = Options::new();
    opts.optflag("h", "help", "print this help menu and exit");
    opts.optflag("v", "version", "print version and exit");
    opts.reqopt("n", "node", "debugger host/node", "HOST");
    opts.reqopt("t", "tport", "debugger RPC port", "PORT");
    opts.reqopt("l", "lport", "local TCP listen port", "PORT");
    opts.optopt("k", "packlen", "UDP packet length cap (<= 1024)", "BYTES");
    opts.optopt("c", "cmm", "debugger script to run after attach", "PATH");
    opts.optopt("r", "record", "transcript log file", "PATH");
    opts
}

fn usage(program: &str, opts: &Options) -> String {
    let brief = format!("Usage: {program} [options]");
    opts.usage(&brief)
}

fn parse_port(option: &'static str, value: &str) -> Result<u16, ConfigError> {
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidValue {
            option,
            value: value.to_string(),
        })
}

/// Parse `argv` (including the program name in position 0) into an `Action`.
///
/// `--help`/`--version` are recognized even when required options are
/// missing, matching the original's precedence (usage can always be
/// printed). Any other missing-required-option case surfaces as
/// `ConfigError::MissingOption`.
pub fn parse(argv: &[String]) -> Result<Action, ConfigError> {
    let program = argv.first().map(String::as_str).unwrap_or("telnet-rtt");
    let opts = options();

    // getopts reports missing required options as a parse error, so we
    // first do a best-effort free parse to detect --help/--version even
    // when -n/-t/-l are absent, then re-parse strictly for the real run.
    let mut loose = Options::new();
    loose.optflag("h", "help", "");
    loose.optflag("v", "version", "");
    if let Ok(matches) = loose.parse(&argv[1..]) {
        if matches.opt_present("help") {
            return Ok(Action::Help(usage(program, &opts)));
        }
        if matches.opt_present("version") {
            return Ok(Action::Version(format!(
                "{} {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )));
        }
    }

    let matches = opts.parse(&argv[1..]).map_err(|_| {
        // getopts folds "missing required" and "unrecognized" into one
        // Fail variant; naming any one of the required options is enough.
        ConfigError::MissingOption("node/tport/lport")
    })?;

    let node = matches.opt_str("node").ok_or(ConfigError::MissingOption("node"))?;
    let tport = parse_port("tport", &matches.opt_str("tport").ok_or(ConfigError::MissingOption("tport"))?)?;
    let lport = parse_port("lport", &matches.opt_str("lport").ok_or(ConfigError::MissingOption("lport"))?)?;

    let packlen = match matches.opt_str("packlen") {
        Some(s) => {
            let n: u32 = s.parse().map_err(|_| ConfigError::InvalidValue {
                option: "packlen",
                value: s.clone(),
            })?;
            if n > PACKLEN_MAX {
                return Err(ConfigError::PacklenTooLarge(n));
            }
            Some(n)
        }
        None => None,
    };

    Ok(Action::Run(Config {
        node,
        tport,
        lport,
        packlen,
        cmm: matches.opt_str("cmm"),
        record: matches.opt_str("record"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("telnet-rtt")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn help_short_circuits_missing_required() {
        let action = parse(&argv(&["--help"])).unwrap();
        assert!(matches!(action, Action::Help(_)));
    }

    #[test]
    fn version_short_circuits_missing_required() {
        let action = parse(&argv(&["-v"])).unwrap();
        assert!(matches!(action, Action::Version(_)));
    }

    #[test]
    fn missing_node_is_config_error() {
        let err = parse(&argv(&["--tport", "20000", "--lport", "23"])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption(_)));
    }

    #[test]
    fn full_run_parses() {
        let action = parse(&argv(&[
            "-n", "localhost", "-t", "20000", "-l", "23", "-k", "1024",
        ]))
        .unwrap();
        match action {
            Action::Run(cfg) => {
                assert_eq!(cfg.node, "localhost");
                assert_eq!(cfg.tport, 20000);
                assert_eq!(cfg.lport, 23);
                assert_eq!(cfg.packlen, Some(1024));
            }
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn packlen_over_limit_rejected() {
        let err = parse(&argv(&[
            "-n", "localhost", "-t", "20000", "-l", "23", "-k", "2048",
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::PacklenTooLarge(2048)));
    }
}

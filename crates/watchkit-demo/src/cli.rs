#![forbid(unsafe_code)]

//! Command-line argument parsing for the scenario runner.
//!
//! Parses args manually. Supports an environment override via
//! `WATCHKIT_DEMO_SCENARIO`; explicit flags win over the environment.

use std::env;
use std::process;

use crate::scenario::Scenario;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable selecting the default scenario.
pub const ENV_SCENARIO: &str = "WATCHKIT_DEMO_SCENARIO";

const HELP_TEXT: &str = "\
watchkit demo: one-shot change tracking over Suspect objects

USAGE:
    watchkit-demo [OPTIONS]

OPTIONS:
    --scenario=NAME      Scenario to run: 'single', 'cross', or 'all' (default: all)
    --help, -h           Show this help message
    --version, -V        Show version

SCENARIOS:
    single  Watch one suspect's name; only the first name change notifies
    cross   Watch a property on each of two suspects; the first change wins

ENVIRONMENT VARIABLES:
    WATCHKIT_DEMO_SCENARIO   Override the default scenario (single|cross|all)
    WATCHKIT_TRACE_ACCESS    Log every tracked read (1/0, true/false, on/off)
    WATCHKIT_TRACE_MUTATION  Log every mutation (default: on)
    WATCHKIT_DIAGNOSTICS     Forward events to diagnostic hooks (default: on)
    RUST_LOG                 Log filter (default: info,watchkit=debug)";

/// Parsed command-line options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Opts {
    pub scenario: Scenario,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseError {
    Help,
    Version,
    InvalidValue { flag: &'static str, value: String },
    UnknownArg(String),
}

impl Opts {
    /// Parse command-line arguments and environment variables, exiting the
    /// process on `--help`, `--version` or bad input.
    pub fn parse() -> Self {
        match Self::parse_from_env_and_args(env::args().skip(1), |key| env::var(key).ok()) {
            Ok(opts) => opts,
            Err(ParseError::Help) => {
                println!("{HELP_TEXT}");
                process::exit(0);
            }
            Err(ParseError::Version) => {
                println!("watchkit-demo {VERSION}");
                process::exit(0);
            }
            Err(ParseError::InvalidValue { flag, value }) => {
                eprintln!("Invalid {flag} value: {value}");
                eprintln!("{HELP_TEXT}");
                process::exit(2);
            }
            Err(ParseError::UnknownArg(arg)) => {
                eprintln!("Unknown argument: {arg}");
                eprintln!("{HELP_TEXT}");
                process::exit(2);
            }
        }
    }

    fn parse_from_env_and_args<I, S, F>(args: I, get_env: F) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();

        if let Some(val) = get_env(ENV_SCENARIO)
            && let Ok(scenario) = val.parse()
        {
            opts.scenario = scenario;
        }

        for arg in args {
            match arg.as_ref() {
                "--help" | "-h" => return Err(ParseError::Help),
                "--version" | "-V" => return Err(ParseError::Version),
                other => {
                    if let Some(val) = other.strip_prefix("--scenario=") {
                        match val.parse() {
                            Ok(scenario) => opts.scenario = scenario,
                            Err(_) => {
                                return Err(ParseError::InvalidValue {
                                    flag: "--scenario",
                                    value: val.to_string(),
                                });
                            }
                        }
                    } else {
                        return Err(ParseError::UnknownArg(other.to_string()));
                    }
                }
            }
        }

        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_with_env<I, S>(
        args: I,
        env_pairs: &[(&'static str, &'static str)],
    ) -> Result<Opts, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = std::collections::HashMap::new();
        for (key, value) in env_pairs {
            map.insert(*key, *value);
        }
        Opts::parse_from_env_and_args(args, |key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn default_opts() {
        assert_eq!(Opts::default().scenario, Scenario::All);
        assert_eq!(parse_with_env(Vec::<&str>::new(), &[]), Ok(Opts::default()));
    }

    #[test]
    fn version_string_nonempty() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn help_text_lists_every_scenario() {
        for name in Scenario::NAMES {
            assert!(HELP_TEXT.contains(name), "missing {name}");
        }
        assert!(HELP_TEXT.contains(ENV_SCENARIO));
    }

    #[test]
    fn scenario_flag() {
        let opts = parse_with_env(["--scenario=cross"], &[]).unwrap();
        assert_eq!(opts.scenario, Scenario::Cross);
    }

    #[test]
    fn env_sets_default() {
        let opts = parse_with_env(Vec::<&str>::new(), &[(ENV_SCENARIO, "single")]).unwrap();
        assert_eq!(opts.scenario, Scenario::Single);
    }

    #[test]
    fn flag_overrides_env() {
        let opts = parse_with_env(["--scenario=cross"], &[(ENV_SCENARIO, "single")]).unwrap();
        assert_eq!(opts.scenario, Scenario::Cross);
    }

    #[test]
    fn invalid_env_is_ignored() {
        let opts = parse_with_env(Vec::<&str>::new(), &[(ENV_SCENARIO, "nope")]).unwrap();
        assert_eq!(opts.scenario, Scenario::All);
    }

    #[test]
    fn invalid_flag_value() {
        assert_eq!(
            parse_with_env(["--scenario=nope"], &[]),
            Err(ParseError::InvalidValue {
                flag: "--scenario",
                value: "nope".into(),
            })
        );
    }

    #[test]
    fn unknown_arg() {
        assert_eq!(
            parse_with_env(["--frobnicate"], &[]),
            Err(ParseError::UnknownArg("--frobnicate".into()))
        );
    }

    #[test]
    fn help_and_version_short_circuit() {
        assert_eq!(parse_with_env(["-h", "--bogus"], &[]), Err(ParseError::Help));
        assert_eq!(parse_with_env(["--version"], &[]), Err(ParseError::Version));
        assert_eq!(parse_with_env(["-V"], &[]), Err(ParseError::Version));
    }
}

//! Command line handling.
//!
//! The flags keep the single-dash spelling of the original check (`-dw 3 -pdbhost db1`) so
//! existing nagios command definitions keep working. clap only knows `--dw`, so the raw
//! arguments go through [normalize_args] first.

use std::ffi::OsString;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{Command, CommandFactory, Parser};

use crate::{RunnerResult, ServiceState};

pub const DEFAULT_WARNING_DAYS: i64 = 2;
pub const DEFAULT_CRITICAL_DAYS: i64 = 4;
pub const DEFAULT_PDBHOST: &str = "localhost";
pub const DEFAULT_PDBPORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Parser)]
#[command(
    name = "check_puppetdb_nodes",
    version,
    about = "Reports PuppetDB nodes that haven't applied their catalog recently"
)]
pub struct Cli {
    /// Days node hasn't checked in to warn about
    #[arg(long = "dw", default_value_t = DEFAULT_WARNING_DAYS, allow_negative_numbers = true)]
    pub warning_days: i64,

    /// Days node hasn't checked in to crit about
    #[arg(long = "dc", default_value_t = DEFAULT_CRITICAL_DAYS, allow_negative_numbers = true)]
    pub critical_days: i64,

    /// Hostname or IP of puppetdb host
    #[arg(long = "pdbhost", default_value = DEFAULT_PDBHOST)]
    pub pdbhost: String,

    /// Port of the puppetdb HTTP API
    #[arg(long = "pdbport", default_value_t = DEFAULT_PDBPORT)]
    pub pdbport: u16,

    /// Seconds to wait for puppetdb to answer
    #[arg(long = "timeout", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Log filter for stderr diagnostics, used when RUST_LOG is unset
    #[arg(long = "log-level", default_value = "warn")]
    pub log_level: String,

    /// Print an Icinga CheckCommand definition for this plugin and exit
    #[arg(long = "generate-icinga-command", hide = true)]
    pub generate_icinga_command: bool,
}

impl Cli {
    /// Parses raw process arguments, accepting the single-dash flag spelling.
    pub fn try_parse_normalized<I, T>(args: I) -> Result<Cli, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Cli::try_parse_from(normalize_args(args, &Cli::command()))
    }
}

/// `--help` and `--version` come back from clap as errors but aren't failures.
pub fn is_help_or_version(err: &clap::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
    )
}

/// Reports a command line mistake as UNKNOWN, clap's own exit code 2 would read as CRITICAL.
pub fn usage_error(err: &clap::Error) -> RunnerResult<String> {
    RunnerResult::Err(ServiceState::Unknown, err.to_string().trim().to_owned())
}

/// Everything the check needs to know, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub warning_days: i64,
    pub critical_days: i64,
    pub pdbhost: String,
    pub pdbport: u16,
    pub timeout: Duration,
}

impl Config {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.pdbhost, self.pdbport)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            warning_days: DEFAULT_WARNING_DAYS,
            critical_days: DEFAULT_CRITICAL_DAYS,
            pdbhost: DEFAULT_PDBHOST.to_owned(),
            pdbport: DEFAULT_PDBPORT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl From<&Cli> for Config {
    fn from(cli: &Cli) -> Self {
        Config {
            warning_days: cli.warning_days,
            critical_days: cli.critical_days,
            pdbhost: cli.pdbhost.clone(),
            pdbport: cli.pdbport,
            timeout: Duration::from_secs(cli.timeout),
        }
    }
}

/// Rewrites `-name` and `-name=value` to `--name` for every long flag `cmd` declares.
///
/// The program name, values, short flags and everything after `--` are left alone.
pub fn normalize_args<I, T>(args: I, cmd: &Command) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let longs: Vec<&str> = cmd.get_arguments().filter_map(|a| a.get_long()).collect();
    let mut passthrough = false;

    args.into_iter()
        .map(Into::into)
        .enumerate()
        .map(|(i, arg)| {
            if i == 0 || passthrough {
                return arg;
            }
            if arg == "--" {
                passthrough = true;
                return arg;
            }

            match arg.to_str() {
                Some(s) if is_single_dash_long(s, &longs) => OsString::from(format!("-{}", s)),
                _ => arg,
            }
        })
        .collect()
}

fn is_single_dash_long(arg: &str, longs: &[&str]) -> bool {
    let Some(rest) = arg.strip_prefix('-') else {
        return false;
    };
    if rest.starts_with('-') {
        return false;
    }

    let name = rest.split_once('=').map_or(rest, |(name, _)| name);
    longs.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_normalized(args.iter().copied()).expect("arguments should parse")
    }

    fn parse_err(args: &[&str]) -> clap::Error {
        Cli::try_parse_normalized(args.iter().copied()).unwrap_err()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["check_puppetdb_nodes"]);
        assert_eq!(Config::from(&cli), Config::default());
        assert_eq!(&cli.log_level, "warn");
        assert!(!cli.generate_icinga_command);

        assert_eq!(&Config::default().base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_single_dash_flags() {
        let cli = parse(&[
            "check_puppetdb_nodes",
            "-dw",
            "3",
            "-dc=7",
            "-pdbhost",
            "puppetdb.example.com",
            "-timeout",
            "5",
        ]);
        let config = Config::from(&cli);

        assert_eq!(config.warning_days, 3);
        assert_eq!(config.critical_days, 7);
        assert_eq!(&config.pdbhost, "puppetdb.example.com");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(&config.base_url(), "http://puppetdb.example.com:8080");
    }

    #[test]
    fn test_single_and_double_dash_agree() {
        let single = parse(&["check", "-dw", "1", "-pdbport", "8081"]);
        let double = parse(&["check", "--dw", "1", "--pdbport=8081"]);

        assert_eq!(Config::from(&single), Config::from(&double));
    }

    #[test]
    fn test_negative_days_stay_values() {
        let cli = parse(&["check", "-dw", "-1"]);
        assert_eq!(cli.warning_days, -1);
    }

    #[test]
    fn test_normalize_args_leaves_unknown_and_passthrough_alone() {
        let args = normalize_args(
            ["-dw", "-dw", "-x", "--dc", "-pdbhostx", "--", "-dc"],
            &Cli::command(),
        );

        let expected: Vec<OsString> = ["-dw", "--dw", "-x", "--dc", "-pdbhostx", "--", "-dc"]
            .into_iter()
            .map(OsString::from)
            .collect();
        assert_eq!(args, expected);
    }

    #[test]
    fn test_invalid_value_is_unknown() {
        let err = parse_err(&["check", "-dw", "abc"]);
        assert!(!is_help_or_version(&err));

        let result = usage_error(&err);
        assert_eq!(result.state(), ServiceState::Unknown);
        assert_eq!(result.state().exit_code(), 3);

        let output = result.to_nagios_string();
        assert!(output.starts_with("UNKNOWN: error: invalid value 'abc'"), "{}", output);
        assert!(output.contains("--dw"), "{}", output);
        assert!(!output.ends_with('\n'));
    }

    #[test]
    fn test_unknown_flag_is_unknown() {
        let err = parse_err(&["check", "-bogus"]);
        assert!(!is_help_or_version(&err));

        let result = usage_error(&err);
        assert_eq!(result.state().exit_code(), 3);
        assert!(result.to_nagios_string().starts_with("UNKNOWN: error: "));
    }

    #[test]
    fn test_help_and_version_are_not_usage_errors() {
        assert!(is_help_or_version(&parse_err(&["check", "--help"])));
        assert!(is_help_or_version(&parse_err(&["check", "-h"])));
        assert!(is_help_or_version(&parse_err(&["check", "--version"])));
    }
}

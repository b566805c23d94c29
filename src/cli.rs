//! Command-line interface for airquality-exporter.
//!
//! Uses lexopt for minimal binary size overhead (~34KB).

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
///
/// Options left as `None` fall back to the environment, the config file and
/// then the built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Address to listen on for telemetry.
    pub listen_address: Option<String>,
    /// Serial port path.
    pub port_path: Option<String>,
    /// Sensor cycle length in minutes.
    pub cycle: Option<u8>,
    /// Force set cycle on every program start.
    pub force_set_cycle: Option<bool>,
    /// Enable debug logging.
    pub verbose: bool,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('v') | Long("verbose") => {
                result.verbose = true;
            }
            Long("web.listen-address") => {
                result.listen_address = Some(parser.value()?.parse()?);
            }
            Long("port-path") => {
                result.port_path = Some(parser.value()?.parse()?);
            }
            Long("cycle") => {
                let value: String = parser.value()?.parse()?;
                result.cycle = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("cycle", value))?,
                );
            }
            Long("force-set-cycle") => {
                let enabled = match parser.optional_value() {
                    Some(value) => parse_bool("force-set-cycle", value.string()?)?,
                    None => true,
                };
                result.force_set_cycle = Some(enabled);
            }
            Long("no-force-set-cycle") => {
                result.force_set_cycle = Some(false);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn parse_bool(name: &'static str, value: String) -> Result<bool, ArgsError> {
    match value.as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ArgsError::InvalidValue(name, value)),
    }
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"airquality-exporter {version}
Prometheus exporter for SDS011 particulate matter sensors

USAGE:
    airquality-exporter [OPTIONS]

OPTIONS:
        --web.listen-address <ADDR>  Address to listen on for telemetry [default: :9999]
        --port-path <PATH>           Serial port path [default: /dev/ttyUSB0]
        --cycle <MINUTES>            Sensor cycle length in minutes, 0-30 [default: 5]
        --force-set-cycle[=BOOL]     Force set cycle on every program start [default: true]
        --no-force-set-cycle         Only set the cycle when it differs
    -c, --config <FILE>              Path to configuration file (JSON)
    -v, --verbose                    Verbose mode
    -h, --help                       Print help
    -V, --version                    Print version

ENVIRONMENT VARIABLES:
    AIRQUALITY_LISTEN_ADDRESS   Listen address (overrides config)
    AIRQUALITY_PORT_PATH        Serial port path (overrides config)
    AIRQUALITY_CYCLE            Sensor cycle (overrides config)
    AIRQUALITY_LOG_LEVEL        Log level (overrides config)
    RUST_LOG                    Full log filter directive

EXAMPLES:
    # Start with defaults (:9999, /dev/ttyUSB0, 5 minute cycle)
    airquality-exporter

    # Sensor on another port, continuous reporting, debug logs
    airquality-exporter --port-path /dev/ttyAMA0 --cycle 0 -v
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("airquality-exporter {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

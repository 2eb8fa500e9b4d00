/*!
 * Command Line
 *
 * One positional argument runs the server on that port; three run the
 * request-file client against a server. Port arguments are checked here so
 * both modes reject them with the same messages.
 */

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::net::ServerConfig;
use crate::protocol::ErrorLength;

pub const USAGE: &str =
    "tuplespace <port> | tuplespace <server_host> <server_port> <request_file>";

/// Ports below this usually need administrative privileges to bind.
pub const FIRST_UNPRIVILEGED_PORT: u16 = 1024;

pub const PRIVILEGED_PORT_WARNING: &str =
    "Warning: Ports below 1024 usually require administrative privileges.";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, override_usage = USAGE)]
pub struct Cli {
    /// `<port>` to serve, or `<server_host> <server_port> <request_file>` to replay requests.
    #[arg(value_name = "ARGS", allow_negative_numbers = true)]
    pub args: Vec<String>,

    /// Seconds between statistics reports (server mode).
    #[arg(long, default_value_t = 10, value_name = "SECS")]
    pub report_interval: u64,

    /// Close client connections idle for this many seconds; 0 never does (server mode).
    #[arg(long, value_name = "SECS")]
    pub read_timeout: Option<u64>,

    /// Compute the length header of error responses instead of sending the fixed `024`.
    #[arg(long)]
    pub true_error_length: bool,
}

/// What the process was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Server { port: u16 },
    Client { host: String, port: u16, requests: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CliError {
    #[error("Error: The provided port is not a valid integer.")]
    PortNotInteger,
    #[error("Error: The provided port is out of valid range (0 - 65535).")]
    PortOutOfRange,
    #[error("Usage: {}", USAGE)]
    Usage,
}

/// Parse a port argument, telling "not a number" apart from "out of range".
pub fn parse_port(s: &str) -> Result<u16, CliError> {
    let n: i64 = s.trim().parse().map_err(|_| CliError::PortNotInteger)?;
    u16::try_from(n).map_err(|_| CliError::PortOutOfRange)
}

pub fn is_privileged(port: u16) -> bool {
    port < FIRST_UNPRIVILEGED_PORT
}

impl Cli {
    /// Pick server or client mode from the positional argument count.
    pub fn mode(&self) -> Result<Mode, CliError> {
        match self.args.as_slice() {
            [port] => Ok(Mode::Server {
                port: parse_port(port)?,
            }),
            [host, port, requests] => Ok(Mode::Client {
                host: host.clone(),
                port: parse_port(port)?,
                requests: PathBuf::from(requests),
            }),
            _ => Err(CliError::Usage),
        }
    }

    pub fn server_config(&self, port: u16) -> ServerConfig {
        ServerConfig {
            report_interval: Duration::from_secs(self.report_interval.max(1)),
            read_timeout: self
                .read_timeout
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs),
            error_length: if self.true_error_length {
                ErrorLength::Computed
            } else {
                ErrorLength::Fixed
            },
            ..ServerConfig::with_port(port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tuplespace").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn one_argument_is_server_mode() {
        assert_eq!(cli(&["5000"]).mode(), Ok(Mode::Server { port: 5000 }));
        assert_eq!(cli(&["0"]).mode(), Ok(Mode::Server { port: 0 }));
        assert_eq!(cli(&["65535"]).mode(), Ok(Mode::Server { port: 65535 }));
    }

    #[test]
    fn three_arguments_are_client_mode() {
        assert_eq!(
            cli(&["localhost", "5000", "reqs.txt"]).mode(),
            Ok(Mode::Client {
                host: "localhost".into(),
                port: 5000,
                requests: PathBuf::from("reqs.txt"),
            })
        );
    }

    #[test]
    fn bad_ports_are_rejected() {
        assert_eq!(parse_port("http"), Err(CliError::PortNotInteger));
        assert_eq!(parse_port("80.5"), Err(CliError::PortNotInteger));
        assert_eq!(parse_port("65536"), Err(CliError::PortOutOfRange));
        assert_eq!(parse_port("-1"), Err(CliError::PortOutOfRange));
        assert_eq!(
            CliError::PortOutOfRange.to_string(),
            "Error: The provided port is out of valid range (0 - 65535)."
        );
    }

    #[test]
    fn other_argument_counts_print_usage() {
        assert_eq!(cli(&[]).mode(), Err(CliError::Usage));
        assert_eq!(cli(&["a", "b"]).mode(), Err(CliError::Usage));
    }

    #[test]
    fn low_ports_are_privileged() {
        assert!(is_privileged(80));
        assert!(is_privileged(1023));
        assert!(!is_privileged(1024));
    }

    #[test]
    fn flags_shape_the_server_config() {
        let c = cli(&["--report-interval", "3", "--read-timeout", "30", "--true-error-length", "7000"]);
        let cfg = c.server_config(7000);
        assert_eq!(cfg.addr.port(), 7000);
        assert!(cfg.addr.ip().is_unspecified());
        assert_eq!(cfg.report_interval, Duration::from_secs(3));
        assert_eq!(cfg.read_timeout, Some(Duration::from_secs(30)));
        assert_eq!(cfg.error_length, ErrorLength::Computed);

        let cfg = cli(&["7000"]).server_config(7000);
        assert_eq!(cfg.report_interval, Duration::from_secs(10));
        assert_eq!(cfg.read_timeout, None);
        assert_eq!(cli(&["--read-timeout", "0", "7000"]).server_config(7000).read_timeout, None);
        assert_eq!(cfg.error_length, ErrorLength::Fixed);
    }
}

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod run;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the simulated device on a transport.
    Run(RunArgs),
    /// Send one command frame to a running device and print the reply.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Tcp,
    Loopback,
    Serial,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Transport carrying the protocol.
    #[arg(long, value_enum, default_value = "tcp")]
    pub transport: TransportKind,
    /// TCP listen address (`host:port`, `port` or `tcp://host:port`).
    #[arg(long, default_value = "0.0.0.0:9001")]
    pub listen: String,
    /// Serial device path (required with `--transport serial`).
    #[arg(long, value_name = "PATH")]
    pub serial_path: Option<String>,
    /// Serial baud rate.
    #[arg(long, default_value = "115200")]
    pub baud: u32,
    /// Device configuration file (JSON).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Loopback only: do not inject the built-in host command sequence.
    #[arg(long)]
    pub no_demo: bool,
    /// Stop after this long (e.g. 30s, 500ms).
    #[arg(long)]
    pub duration: Option<String>,
    /// Seed for sample noise and trigger timing.
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device address (`host:port`).
    pub addr: String,
    /// Command id, decimal or `0x`-prefixed hex.
    #[arg(long, short = 'c', default_value = "0x01", value_parser = parse_u8)]
    pub command: u8,
    /// Sequence number echoed by the reply.
    #[arg(long, default_value = "0")]
    pub seq: u8,
    /// Payload as hex (spaces allowed), e.g. `02 00 10270000 01`.
    #[arg(long, default_value = "")]
    pub payload: String,
    /// Maximum time to wait for the connection and the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}

pub(crate) fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: Vec<u8> = input
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            USAGE,
            format!("hex payload has an odd number of digits: {input}"),
        ));
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|text| u8::from_str_radix(text, 16).ok())
                .ok_or_else(|| CliError::new(USAGE, format!("invalid hex payload: {input}")))
        })
        .collect()
}

pub(crate) fn parse_u8(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("expected a byte value (0-255 or 0x00-0xFF), got {input:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn parse_hex_accepts_spaced_digits() {
        assert_eq!(
            parse_hex("02 00 10270000 01").unwrap(),
            vec![0x02, 0x00, 0x10, 0x27, 0x00, 0x00, 0x01]
        );
        assert!(parse_hex("").unwrap().is_empty());
    }

    #[test]
    fn parse_hex_rejects_bad_input() {
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn parse_u8_decimal_and_hex() {
        assert_eq!(parse_u8("0x14"), Ok(0x14));
        assert_eq!(parse_u8("0XFF"), Ok(0xFF));
        assert_eq!(parse_u8("18"), Ok(18));
        assert!(parse_u8("256").is_err());
        assert!(parse_u8("0x").is_err());
    }
}

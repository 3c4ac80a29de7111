mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "daqsim", version, about = "Simulated data-acquisition device")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        env = "DAQSIM_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::TransportKind;

    #[test]
    fn parses_run_defaults() {
        let cli = Cli::try_parse_from(["daqsim", "run"]).expect("run args should parse");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.transport, TransportKind::Tcp);
        assert_eq!(args.listen, "0.0.0.0:9001");
        assert_eq!(args.baud, 115_200);
        assert!(!args.no_demo);
    }

    #[test]
    fn parses_loopback_run() {
        let cli = Cli::try_parse_from([
            "daqsim",
            "run",
            "--transport",
            "loopback",
            "--duration",
            "2s",
            "--seed",
            "7",
        ])
        .expect("loopback args should parse");
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.transport, TransportKind::Loopback);
        assert_eq!(args.duration.as_deref(), Some("2s"));
        assert_eq!(args.seed, Some(7));
    }

    #[test]
    fn parses_send_with_hex_command() {
        let cli = Cli::try_parse_from([
            "daqsim",
            "send",
            "127.0.0.1:9001",
            "--command",
            "0x14",
            "--seq",
            "2",
            "--payload",
            "01 00 10270000 01",
        ])
        .expect("send args should parse");
        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.command, 0x14);
        assert_eq!(args.seq, 2);
    }

    #[test]
    fn rejects_unknown_transport() {
        let err = Cli::try_parse_from(["daqsim", "run", "--transport", "udp"])
            .expect_err("unknown transport should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn rejects_out_of_range_command() {
        let err = Cli::try_parse_from(["daqsim", "send", "x:1", "--command", "300"])
            .expect_err("command id must fit a byte");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

/// Log targets that follow `--log-level`; everything else is capped at warn.
const DAQSIM_TARGETS: [&str; 4] = ["daqsim", "daqsim_device", "daqsim_frame", "daqsim_transport"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

pub fn directives(level: LogLevel) -> Targets {
    let level = level.as_filter();
    Targets::new()
        .with_default(level.min(LevelFilter::WARN))
        .with_targets(DAQSIM_TARGETS.map(|target| (target, level)))
}

/// Install the stderr subscriber. Thread names tell the loopback host thread
/// and transport workers apart.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);
    let filter = directives(level);

    let _ = match format {
        LogFormat::Text => builder.finish().with(filter).try_init(),
        LogFormat::Json => builder.json().finish().with(filter).try_init(),
    };
}

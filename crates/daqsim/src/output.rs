use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use daqsim_device::{DeviceStats, Response, SessionStats};
use daqsim_frame::{command_name, Frame};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    command: u8,
    command_name: &'a str,
    seq: u8,
    payload_size: usize,
    payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<Response>,
}

pub fn print_frame(frame: &Frame, format: OutputFormat) {
    let name = command_name(frame.command);
    let response = Response::decode(frame.command, frame.payload.as_ref());
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                command: frame.command,
                command_name: name,
                seq: frame.seq,
                payload_size: frame.payload.len(),
                payload: hex(frame.payload.as_ref()),
                response,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let decoded = response
                .as_ref()
                .and_then(|r| serde_json::to_string(r).ok())
                .unwrap_or_default();
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "SEQ", "SIZE", "PAYLOAD", "DECODED"])
                .add_row(vec![
                    format!("0x{:02X} {name}", frame.command),
                    frame.seq.to_string(),
                    frame.payload.len().to_string(),
                    hex(frame.payload.as_ref()),
                    decoded,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command=0x{:02X} ({}) seq={} size={} payload={}",
                frame.command,
                name,
                frame.seq,
                frame.payload.len(),
                hex(frame.payload.as_ref())
            );
            if let Some(response) = &response {
                println!("{response:?}");
            }
        }
        OutputFormat::Raw => {
            print_raw(frame.payload.as_ref());
        }
    }
}

/// Totals printed when `run` ends.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub transport: &'static str,
    pub elapsed_ms: u64,
    pub session: SessionStats,
    pub device: DeviceStats,
}

pub fn print_summary(summary: &RunSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METRIC", "VALUE"]);
            for (name, value) in summary_rows(summary) {
                table.add_row(vec![name.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (name, value) in summary_rows(summary) {
                println!("{name}: {value}");
            }
        }
    }
}

fn summary_rows(summary: &RunSummary) -> Vec<(&'static str, String)> {
    let s = &summary.session;
    let d = &summary.device;
    vec![
        ("transport", summary.transport.to_string()),
        ("elapsed_ms", summary.elapsed_ms.to_string()),
        ("polls", s.polls.to_string()),
        ("bytes_received", s.bytes_received.to_string()),
        ("bytes_dropped", s.bytes_dropped.to_string()),
        ("frames_received", s.frames_received.to_string()),
        ("frames_sent", s.frames_sent.to_string()),
        ("bytes_sent", s.bytes_sent.to_string()),
        ("frames_handled", d.frames_handled.to_string()),
        ("frames_rejected", d.frames_rejected.to_string()),
        ("frames_queued", d.frames_queued.to_string()),
        ("frames_dropped", d.frames_dropped.to_string()),
    ]
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use streamproto_frame::{command_name, ParsedPacket, CMD_STDERR, CMD_STDOUT};

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
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// Where an inbound packet goes on the console.
#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    Stdout(&'a [u8]),
    Stderr(&'a [u8]),
    Ignore,
}

/// Device console output is keyed on the command byte; everything else is
/// not for the terminal.
pub fn route(packet: &ParsedPacket) -> Route<'_> {
    match packet.user_field() {
        CMD_STDOUT => Route::Stdout(packet.payload().as_ref()),
        CMD_STDERR => Route::Stderr(packet.payload().as_ref()),
        _ => Route::Ignore,
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    command: u8,
    command_name: &'a str,
    payload_type: &'a str,
    fragmentation_flag: u8,
    payload_size: usize,
    payload: String,
    endpoint: &'a str,
    timestamp: String,
}

pub fn print_packet(packet: &ParsedPacket, endpoint: &str, format: OutputFormat) {
    let command = packet.user_field();
    let payload = packet.payload().as_ref();

    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                command,
                command_name: command_name(command),
                payload_type: packet.payload_type().name(),
                fragmentation_flag: packet.fragmentation_flag(),
                payload_size: payload.len(),
                payload: payload_preview(payload),
                endpoint,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "TYPE", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    format!("{} ({command})", command_name(command)),
                    packet.payload_type().name().to_string(),
                    payload.len().to_string(),
                    payload_preview(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={} ({}) type={} size={} payload={}",
                command,
                command_name(command),
                packet.payload_type().name(),
                payload.len(),
                payload_preview(payload)
            );
        }
        OutputFormat::Raw => {
            print_raw(payload);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn print_raw_stderr(data: &[u8]) {
    let mut err = std::io::stderr();
    let _ = err.write_all(data);
    let _ = err.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use streamproto_frame::{
    FrameConfig, PacketReader, PacketWriter, PayloadType, CMD_PING, CMD_PONG, CMD_STDERR,
    CMD_STDIN, CMD_STDOUT, SYS_CHDIR, SYS_EXEC, SYS_GETCWD, SYS_LS,
};
use streamproto_transport::{Endpoint, SerialStream};

use crate::exit::{frame_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod console;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a single command packet.
    Send(SendArgs),
    /// Print packets received from the device.
    Listen(ListenArgs),
    /// Interactive shell against the device.
    Console(ConsoleArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Console(args) => console::run(args),
        Command::Version(args) => version::run(args),
    }
}

/// Connection options shared by every command that talks to the device.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Serial bridge endpoint (`tcp://host:port`, `unix:///path` or a socket path).
    #[arg(env = "STREAMPROTO_ENDPOINT")]
    pub endpoint: Endpoint,
    /// Transport read timeout (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms", value_parser = parse_duration)]
    pub read_timeout: Duration,
    /// Sleep between empty reads (e.g. 5ms). 0 disables it.
    #[arg(long, default_value = "5ms", value_parser = parse_duration_allow_zero)]
    pub poll_interval: Duration,
}

impl LinkArgs {
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            read_timeout: Some(self.read_timeout),
            poll_interval: self.poll_interval,
            ..FrameConfig::default()
        }
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Command to send: a name (ls, exec, cd, pwd, stdin, ping) or a numeric ID.
    #[arg(long, short = 'c', value_parser = parse_command_id)]
    pub command: u8,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Payload type. Default: string with a payload, none without.
    #[arg(long = "type", value_name = "TYPE")]
    pub payload_type: Option<PayloadTypeArg>,
    /// Mark the packet as a fragment.
    #[arg(long)]
    pub fragmented: bool,
    /// Wait for one reply packet and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", value_parser = parse_duration)]
    pub wait_timeout: Duration,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Only print these command IDs (comma-separated names or numbers).
    #[arg(long, value_delimiter = ',', value_parser = parse_command_id)]
    pub commands: Option<Vec<u8>>,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ConsoleArgs {
    #[command(flatten)]
    pub link: LinkArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PayloadTypeArg {
    None,
    String,
    Bytes,
    U8,
    U16,
    U32,
    I32,
}

impl From<PayloadTypeArg> for PayloadType {
    fn from(arg: PayloadTypeArg) -> Self {
        match arg {
            PayloadTypeArg::None => PayloadType::None,
            PayloadTypeArg::String => PayloadType::String,
            PayloadTypeArg::Bytes => PayloadType::Bytes,
            PayloadTypeArg::U8 => PayloadType::U8,
            PayloadTypeArg::U16 => PayloadType::U16,
            PayloadTypeArg::U32 => PayloadType::U32,
            PayloadTypeArg::I32 => PayloadType::I32,
        }
    }
}

/// Open the link and split it into a receive half and a send half.
pub fn connect(
    link: &LinkArgs,
) -> CliResult<(PacketReader<SerialStream>, PacketWriter<SerialStream>)> {
    let stream = link
        .endpoint
        .connect()
        .map_err(|err| transport_error("connect failed", err))?;
    let send_half = stream
        .try_clone()
        .map_err(|err| transport_error("connect failed", err))?;

    let config = link.frame_config();
    let reader = PacketReader::with_config_stream(stream, config.clone())
        .map_err(|err| frame_error("connect failed", err))?;
    let writer = PacketWriter::with_config_stream(send_half, config)
        .map_err(|err| frame_error("connect failed", err))?;
    Ok((reader, writer))
}

pub fn parse_command_id(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let id = match input.to_ascii_lowercase().as_str() {
        "ls" => SYS_LS,
        "exec" | "run" => SYS_EXEC,
        "cd" | "chdir" => SYS_CHDIR,
        "pwd" | "getcwd" => SYS_GETCWD,
        "stdin" => CMD_STDIN,
        "stdout" => CMD_STDOUT,
        "stderr" => CMD_STDERR,
        "ping" => CMD_PING,
        "pong" => CMD_PONG,
        other => other
            .parse::<u8>()
            .map_err(|_| format!("unknown command {input:?} (expected a name or 0-255)"))?,
    };
    Ok(id)
}

pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let duration = parse_duration_allow_zero(input)?;
    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(duration)
}

pub fn parse_duration_allow_zero(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("duration must not be empty".to_string());
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
        .map_err(|_| format!("invalid duration value: {input}"))?;

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

pub fn usage(message: impl Into<String>) -> CliError {
    CliError::new(USAGE, message)
}

use std::fs;
use std::io::Read;
use std::time::{Duration, Instant};

use streamproto_frame::{PacketReader, ParsedPacket, PayloadType, FRAGED, UNFRAGED};
use tracing::debug;

use crate::cmd::{connect, usage, SendArgs};
use crate::exit::{frame_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let payload_type = resolve_payload_type(&args, &payload)?;
    let (mut reader, mut writer) = connect(&args.link)?;

    let flag = if args.fragmented { FRAGED } else { UNFRAGED };
    writer
        .send_with_flag(flag, args.command, payload_type, &payload)
        .map_err(|err| frame_error("send failed", err))?;
    debug!(
        command = args.command,
        payload_type = payload_type.name(),
        size = payload.len(),
        "packet sent"
    );

    if args.wait {
        let endpoint = args.link.endpoint.to_string();
        let packet = wait_for_reply(&mut reader, args.wait_timeout)?;
        print_packet(&packet, &endpoint, format);
    }

    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

fn resolve_payload_type(args: &SendArgs, payload: &[u8]) -> CliResult<PayloadType> {
    let payload_type = match args.payload_type {
        Some(arg) => arg.into(),
        None if payload.is_empty() && args.data.is_none() => PayloadType::None,
        None if args.file.is_some() => PayloadType::Bytes,
        None => PayloadType::String,
    };
    if payload_type == PayloadType::None && !payload.is_empty() {
        return Err(usage("--type none cannot carry a payload"));
    }
    Ok(payload_type)
}

fn wait_for_reply<R: Read>(
    reader: &mut PacketReader<R>,
    timeout: Duration,
) -> CliResult<ParsedPacket> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match reader.try_read_packet() {
            Ok(Some(packet)) => return Ok(packet),
            Ok(None) => {
                let interval = reader.config().poll_interval;
                if !interval.is_zero() {
                    std::thread::sleep(interval);
                }
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        }
    }
    Err(CliError::new(
        TIMEOUT,
        format!("no reply within {}ms", timeout.as_millis()),
    ))
}

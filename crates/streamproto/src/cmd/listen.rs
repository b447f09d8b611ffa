use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use streamproto_frame::FrameError;
use tracing::{debug, info};

use crate::cmd::{connect, ListenArgs};
use crate::exit::{frame_error, CliError, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let (mut reader, _writer) = connect(&args.link)?;
    let endpoint = args.link.endpoint.to_string();

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    info!(endpoint = %endpoint, "listening");
    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let packet = match reader.try_read_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                let interval = reader.config().poll_interval;
                if !interval.is_zero() {
                    std::thread::sleep(interval);
                }
                continue;
            }
            Err(FrameError::ConnectionClosed) => {
                debug!("link closed by device");
                break;
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        if !wanted(args.commands.as_deref(), packet.user_field()) {
            continue;
        }

        print_packet(&packet, &endpoint, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    let stats = reader.stats();
    info!(
        printed,
        packets = stats.packets,
        dropped_frames = stats.dropped_frames,
        discarded_bytes = stats.discarded_bytes,
        "listen finished"
    );
    Ok(SUCCESS)
}

fn wanted(filter: Option<&[u8]>, command_id: u8) -> bool {
    filter.is_none_or(|ids| ids.contains(&command_id))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

//! Interactive console.
//!
//! A receiver thread owns one handle to the link and routes device output to
//! the terminal. A second thread forwards stdin lines over a channel; the
//! calling thread turns them into command packets and writes them on a cloned
//! handle, and stops as soon as the receiver sees the link close.

use std::io::{self, BufRead, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use streamproto_frame::{
    command_name, FrameError, PacketReader, PacketWriter, PayloadType, SYS_CHDIR, SYS_EXEC,
    SYS_GETCWD, SYS_LS,
};
use tracing::{debug, info, warn};

use crate::cmd::{connect, ConsoleArgs};
use crate::exit::{frame_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_raw, print_raw_stderr, route, Route};

const HELP: &str = "Commands: exec <file>, ls [path], cd <path>, pwd, exit";
const UNKNOWN: &str = "Unknown command. (Try: ls, exec, cd, pwd, exit)";

/// How often the command loop rechecks the link while waiting for input.
const INPUT_POLL: Duration = Duration::from_millis(50);

/// What one line typed at the prompt asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleAction {
    Send {
        command_id: u8,
        payload_type: PayloadType,
        payload: Vec<u8>,
    },
    Help,
    Exit,
    Usage(&'static str),
    Unknown,
    Empty,
}

pub fn parse_console_line(line: &str) -> ConsoleAction {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleAction::Empty;
    }

    let (verb, arg) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb.to_ascii_lowercase().as_str() {
        "ls" if arg.is_empty() => send(SYS_LS, PayloadType::None, ""),
        "ls" => send(SYS_LS, PayloadType::String, arg),
        "exec" | "run" if arg.is_empty() => ConsoleAction::Usage("Usage: exec <file> [args]"),
        "exec" | "run" => send(SYS_EXEC, PayloadType::String, arg),
        "cd" if arg.is_empty() => ConsoleAction::Usage("Usage: cd <path>"),
        "cd" => send(SYS_CHDIR, PayloadType::String, arg),
        "pwd" => send(SYS_GETCWD, PayloadType::None, ""),
        "help" | "?" => ConsoleAction::Help,
        "exit" | "quit" => ConsoleAction::Exit,
        _ => ConsoleAction::Unknown,
    }
}

fn send(command_id: u8, payload_type: PayloadType, payload: &str) -> ConsoleAction {
    ConsoleAction::Send {
        command_id,
        payload_type,
        payload: payload.as_bytes().to_vec(),
    }
}

pub fn run(args: ConsoleArgs) -> CliResult<i32> {
    let (reader, mut writer) = connect(&args.link)?;
    let endpoint = args.link.endpoint.to_string();
    info!(endpoint = %endpoint, "console connected");

    let lines = spawn_stdin_reader()?;
    let running = Arc::new(AtomicBool::new(true));
    let receiver = {
        let running = running.clone();
        thread::Builder::new()
            .name("streamproto-rx".to_string())
            .spawn(move || receive_loop(reader, &running))
            .map_err(|err| CliError::new(INTERNAL, format!("receiver thread failed: {err}")))?
    };

    println!("{HELP}");
    let result = command_loop(&lines, &mut writer, &running);

    running.store(false, Ordering::SeqCst);
    if let Err(err) = writer.get_ref().shutdown() {
        debug!(error = %err, "shutdown after console exit");
    }
    if receiver.join().is_err() {
        warn!("receiver thread panicked");
    }
    info!("console closed");
    result
}

fn spawn_stdin_reader() -> CliResult<Receiver<io::Result<String>>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("streamproto-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .map_err(|err| CliError::new(INTERNAL, format!("stdin thread failed: {err}")))?;
    Ok(rx)
}

/// Read commands until `exit`, end of input, a send failure, or the receiver
/// clearing `running`.
fn command_loop<W: Write>(
    lines: &Receiver<io::Result<String>>,
    writer: &mut PacketWriter<W>,
    running: &AtomicBool,
) -> CliResult<i32> {
    let mut prompt = true;
    while running.load(Ordering::SeqCst) {
        if prompt {
            print!("> ");
            let _ = io::stdout().flush();
            prompt = false;
        }

        let line = match lines.recv_timeout(INPUT_POLL) {
            Ok(Ok(line)) => line,
            Ok(Err(err)) => return Err(crate::exit::io_error("stdin read failed", err)),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        prompt = true;

        match parse_console_line(&line) {
            ConsoleAction::Send {
                command_id,
                payload_type,
                payload,
            } => {
                if let Err(err) = writer.send(command_id, payload_type, &payload) {
                    if matches!(err, FrameError::PayloadTooLarge { .. }) {
                        eprintln!("{err}");
                        continue;
                    }
                    return Err(frame_error("send failed", err));
                }
                debug!(command = command_name(command_id), "command sent");
            }
            ConsoleAction::Help => println!("{HELP}"),
            ConsoleAction::Usage(usage) => println!("{usage}"),
            ConsoleAction::Unknown => println!("{UNKNOWN}"),
            ConsoleAction::Empty => {}
            ConsoleAction::Exit => break,
        }
    }
    Ok(SUCCESS)
}

fn receive_loop<R: Read>(mut reader: PacketReader<R>, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        let packet = match reader.try_read_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                let interval = reader.config().poll_interval;
                if !interval.is_zero() {
                    thread::sleep(interval);
                }
                continue;
            }
            Err(FrameError::ConnectionClosed) => {
                if running.swap(false, Ordering::SeqCst) {
                    eprintln!("\nconnection closed by device");
                }
                break;
            }
            Err(err) => {
                if running.load(Ordering::SeqCst) {
                    warn!(error = %err, "receive failed");
                }
                running.store(false, Ordering::SeqCst);
                break;
            }
        };

        match route(&packet) {
            Route::Stdout(data) => print_raw(data),
            Route::Stderr(data) => print_raw_stderr(data),
            Route::Ignore => debug!(
                command = packet.user_field(),
                name = command_name(packet.user_field()),
                "ignoring packet"
            ),
        }
    }

    let stats = reader.stats();
    debug!(
        packets = stats.packets,
        dropped_frames = stats.dropped_frames,
        discarded_bytes = stats.discarded_bytes,
        "receiver stopped"
    );
}

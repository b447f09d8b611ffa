//! Simulated device: answers console commands over a Unix socket.
//!
//! Run with:
//!   cargo run --example device-sim -- /tmp/streamproto-device.sock
//!
//! In another terminal:
//!   cargo run --features cli -- console /tmp/streamproto-device.sock

#[cfg(unix)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::fs;
    use std::io::Write;
    use std::os::unix::net::UnixListener;
    use std::path::PathBuf;

    use streamproto::frame::{FrameError, PacketReader, PacketWriter};
    use streamproto::transport::SerialStream;

    let sock_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("streamproto-device.sock"));

    // Ensure no stale socket
    let _ = fs::remove_file(&sock_path);

    let listener = UnixListener::bind(&sock_path)?;
    eprintln!("Device listening on {}", sock_path.display());

    let (stream, _) = listener.accept()?;
    let stream = SerialStream::from_unix(stream);
    let mut writer = PacketWriter::new(stream.try_clone()?);
    let mut reader = PacketReader::new(stream);

    // Boot chatter on the line before the first frame; the host resyncs past it.
    writer.get_mut().write_all(b"\xFFboot v0.1\r\n")?;

    let mut device = Device::new();
    loop {
        let packet = match reader.read_packet() {
            Ok(packet) => packet,
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(err.into()),
        };
        eprintln!(
            "<- {} ({} bytes)",
            streamproto::frame::command_name(packet.user_field()),
            packet.payload().len()
        );
        let (command, text) = device.handle(packet.user_field(), packet.payload());
        writer.send(command, streamproto::frame::PayloadType::String, text.as_bytes())?;
    }

    eprintln!("Host disconnected");
    let _ = fs::remove_file(&sock_path);
    Ok(())
}

#[cfg(unix)]
struct Device {
    cwd: String,
}

#[cfg(unix)]
impl Device {
    fn new() -> Self {
        Self {
            cwd: "/".to_string(),
        }
    }

    fn handle(&mut self, command_id: u8, payload: &[u8]) -> (u8, String) {
        use streamproto::frame::{
            CMD_PING, CMD_PONG, CMD_STDERR, CMD_STDOUT, SYS_CHDIR, SYS_EXEC, SYS_GETCWD, SYS_LS,
        };

        let arg = String::from_utf8_lossy(payload).into_owned();
        match command_id {
            SYS_LS => (CMD_STDOUT, "bin\nhome\nhello.elf\n".to_string()),
            SYS_GETCWD => (CMD_STDOUT, format!("{}\n", self.cwd)),
            SYS_CHDIR if arg.starts_with('/') => {
                self.cwd = arg;
                (CMD_STDOUT, String::new())
            }
            SYS_CHDIR => (CMD_STDERR, format!("cd: {arg}: not found\n")),
            SYS_EXEC => (CMD_STDOUT, format!("[{arg}] exited with 0\n")),
            CMD_PING => (CMD_PONG, String::new()),
            other => (CMD_STDERR, format!("unsupported command {other}\n")),
        }
    }
}

#[cfg(not(unix))]
fn main() {
    eprintln!("device-sim needs Unix domain sockets");
}

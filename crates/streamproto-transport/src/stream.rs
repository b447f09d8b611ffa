use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected byte stream to the device side. Implements `Read` and `Write`.
///
/// Reads follow the usual `std::io` contract: `Ok(0)` means the peer closed
/// the stream, and `WouldBlock`/`TimedOut` mean no bytes arrived within the
/// configured read timeout.
pub struct SerialStream {
    inner: SerialStreamInner,
}

enum SerialStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.read(buf),
            SerialStreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.write(buf),
            SerialStreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.flush(),
            SerialStreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl SerialStream {
    /// Wrap an already-connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: SerialStreamInner::Unix(stream),
        }
    }

    /// Wrap an already-connected TCP stream (sets `TCP_NODELAY`).
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self {
            inner: SerialStreamInner::Tcp(stream),
        })
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            SerialStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
            SerialStreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    ///
    /// Used to hand the receive path and the send path separate handles.
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
            SerialStreamInner::Tcp(stream) => Ok(Self {
                inner: SerialStreamInner::Tcp(stream.try_clone()?),
            }),
        }
    }

    /// Shut down both directions. Clones observe end of stream.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both).map_err(Into::into),
            SerialStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both).map_err(Into::into),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            SerialStreamInner::Unix(_) => "unix-domain-socket",
            SerialStreamInner::Tcp(_) => "tcp",
        }
    }
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialStream")
            .field("type", &self.transport_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    #[cfg(unix)]
    fn clone_shares_the_connection() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let writer = SerialStream::from_unix(left);
        let mut reader = SerialStream::from_unix(right);

        let mut cloned = writer.try_clone().unwrap();
        cloned.write_all(b"abc").unwrap();

        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[test]
    #[cfg(unix)]
    fn read_timeout_surfaces_as_would_block_or_timed_out() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let _keep = SerialStream::from_unix(left);
        let mut reader = SerialStream::from_unix(right);
        reader
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();

        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut
        ));
    }

    #[test]
    #[cfg(unix)]
    fn shutdown_is_seen_as_end_of_stream() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut reader = SerialStream::from_unix(left);
        let other = SerialStream::from_unix(right);

        other.shutdown().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn tcp_roundtrip_over_loopback() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let (mut server, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            server.read_exact(&mut buf).unwrap();
            buf
        });

        let mut client = SerialStream::from_tcp(TcpStream::connect(addr).unwrap()).unwrap();
        assert_eq!(client.transport_name(), "tcp");
        client.write_all(b"ping").unwrap();

        assert_eq!(&handle.join().unwrap(), b"ping");
    }
}

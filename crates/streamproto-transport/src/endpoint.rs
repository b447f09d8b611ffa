use std::fmt;
use std::net::TcpStream;
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::SerialStream;

const TCP_SCHEME: &str = "tcp://";
#[cfg(unix)]
const UNIX_SCHEME: &str = "unix://";

/// Where the serial bridge listens.
///
/// Accepted forms:
/// - `tcp://host:port`
/// - `unix:///path/to/socket`
/// - `/path/to/socket` (bare paths are Unix domain sockets)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    #[cfg(unix)]
    Unix(PathBuf),
    Tcp(String),
}

impl Endpoint {
    /// Connect to the endpoint (blocking).
    pub fn connect(&self) -> Result<SerialStream> {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = std::os::unix::net::UnixStream::connect(path).map_err(|e| {
                    TransportError::Connect {
                        endpoint: self.to_string(),
                        source: e,
                    }
                })?;
                debug!(?path, "connected to unix domain socket");
                Ok(SerialStream::from_unix(stream))
            }
            Endpoint::Tcp(addr) => {
                let stream =
                    TcpStream::connect(addr.as_str()).map_err(|e| TransportError::Connect {
                        endpoint: self.to_string(),
                        source: e,
                    })?;
                debug!(%addr, "connected to tcp endpoint");
                SerialStream::from_tcp(stream)
            }
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TransportError::InvalidAddress(input.to_string()));
        }

        if let Some(addr) = trimmed.strip_prefix(TCP_SCHEME) {
            let valid = addr
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid {
                return Err(TransportError::InvalidAddress(input.to_string()));
            }
            return Ok(Endpoint::Tcp(addr.to_string()));
        }

        parse_path(input, trimmed)
    }
}

#[cfg(unix)]
fn parse_path(input: &str, trimmed: &str) -> Result<Endpoint> {
    let path = trimmed.strip_prefix(UNIX_SCHEME).unwrap_or(trimmed);
    if path.is_empty() || path.contains("://") {
        return Err(TransportError::InvalidAddress(input.to_string()));
    }
    Ok(Endpoint::Unix(PathBuf::from(path)))
}

#[cfg(not(unix))]
fn parse_path(input: &str, _trimmed: &str) -> Result<Endpoint> {
    Err(TransportError::InvalidAddress(input.to_string()))
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "{UNIX_SCHEME}{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "{TCP_SCHEME}{addr}"),
        }
    }
}

//! Connection string parsing

use std::fmt;
use std::time::Duration;

use visca_core::constants::DEFAULT_BAUD_RATE;

use crate::{
    Transport,
    error::{Error, Result},
    rfc2217::Rfc2217Transport,
    serial::SerialTransport,
    tcp::TcpTransport,
};

/// Protocol spoken over `host:port` connection strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetMode {
    /// Bare VISCA bytes on the socket
    RawTcp,
    /// Telnet remote serial port (RFC 2217)
    #[default]
    Rfc2217,
}

/// Kind of an open link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Serial,
    RawTcp,
    Rfc2217,
    Memory,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Serial => "serial",
            Self::RawTcp => "tcp",
            Self::Rfc2217 => "rfc2217",
            Self::Memory => "memory",
        })
    }
}

/// Link parameters shared by every transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOptions {
    /// Serial line speed, 8N1 without flow control
    pub baud_rate: u32,
    pub connect_timeout: Duration,
    /// Time the RFC 2217 server has to accept the COM port option
    pub negotiation_timeout: Duration,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            connect_timeout: Duration::from_secs(5),
            negotiation_timeout: Duration::from_secs(2),
        }
    }
}

impl LinkOptions {
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }
}

/// Parsed connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Serial { path: String },
    Network { host: String, port: u16, mode: NetMode },
}

impl Endpoint {
    /// Parse a connection string
    ///
    /// Device paths (`/dev/ttyUSB0`, `\\.\COM3`, `COM1`) select a serial
    /// port. `host:port` selects a network link whose protocol is `mode`,
    /// unless a `rfc2217://`, `socket://` or `tcp://` prefix says otherwise.
    ///
    /// # Examples
    ///
    /// ```
    /// use visca_transport::{Endpoint, NetMode};
    ///
    /// let endpoint = Endpoint::parse("socket://10.0.0.5:5678", NetMode::Rfc2217).unwrap();
    /// assert_eq!(
    ///     endpoint,
    ///     Endpoint::Network { host: "10.0.0.5".into(), port: 5678, mode: NetMode::RawTcp }
    /// );
    /// ```
    pub fn parse(s: &str, mode: NetMode) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAddress("empty connection string".into()));
        }

        if let Some((scheme, rest)) = s.split_once("://") {
            let mode = match scheme.to_ascii_lowercase().as_str() {
                "rfc2217" => NetMode::Rfc2217,
                "socket" | "tcp" => NetMode::RawTcp,
                other => {
                    return Err(Error::InvalidAddress(format!("unknown scheme '{other}'")));
                }
            };
            return Self::parse_network(rest, mode);
        }

        if is_device_path(s) {
            return Ok(Self::Serial { path: s.to_string() });
        }

        Self::parse_network(s, mode)
    }

    fn parse_network(s: &str, mode: NetMode) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidAddress(format!("{s}: {reason}"));

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, rest) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unclosed '['"))?;
            let port = rest.strip_prefix(':').ok_or_else(|| invalid("missing port"))?;
            (host, port)
        } else {
            let (host, port) = s.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
            if host.contains(':') {
                return Err(invalid("IPv6 hosts need brackets"));
            }
            (host, port)
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }

        let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
        if port == 0 {
            return Err(invalid("port 0"));
        }

        Ok(Self::Network {
            host: host.to_string(),
            port,
            mode,
        })
    }

    pub fn kind(&self) -> LinkKind {
        match self {
            Self::Serial { .. } => LinkKind::Serial,
            Self::Network {
                mode: NetMode::RawTcp,
                ..
            } => LinkKind::RawTcp,
            Self::Network {
                mode: NetMode::Rfc2217,
                ..
            } => LinkKind::Rfc2217,
        }
    }

    /// Build an unopened transport for this endpoint
    pub fn into_transport(self, options: &LinkOptions) -> Box<dyn Transport> {
        match self {
            Self::Serial { path } => Box::new(SerialTransport::new(path, options.baud_rate)),
            Self::Network {
                host,
                port,
                mode: NetMode::RawTcp,
            } => Box::new(
                TcpTransport::new(host, port).with_connect_timeout(options.connect_timeout),
            ),
            Self::Network {
                host,
                port,
                mode: NetMode::Rfc2217,
            } => Box::new(Rfc2217Transport::new(host, port, options)),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial { path } => f.write_str(path),
            Self::Network { host, port, mode } => {
                let scheme = match mode {
                    NetMode::RawTcp => "socket",
                    NetMode::Rfc2217 => "rfc2217",
                };
                if host.contains(':') {
                    write!(f, "{scheme}://[{host}]:{port}")
                } else {
                    write!(f, "{scheme}://{host}:{port}")
                }
            }
        }
    }
}

fn is_device_path(s: &str) -> bool {
    if s.starts_with('/') || s.starts_with(r"\\.\") {
        return true;
    }
    let lower = s.to_ascii_lowercase();
    lower
        .strip_prefix("com")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn network(host: &str, port: u16, mode: NetMode) -> Endpoint {
        Endpoint::Network {
            host: host.into(),
            port,
            mode,
        }
    }

    #[test]
    fn test_serial_paths() {
        for path in ["/dev/ttyUSB0", r"\\.\COM3", "COM1", "com12"] {
            assert_eq!(
                Endpoint::parse(path, NetMode::RawTcp).unwrap(),
                Endpoint::Serial { path: path.into() }
            );
        }
    }

    #[test]
    fn test_host_port_follows_mode() {
        assert_eq!(
            Endpoint::parse("192.168.1.32:8234", NetMode::default()).unwrap(),
            network("192.168.1.32", 8234, NetMode::Rfc2217)
        );
        assert_eq!(
            Endpoint::parse("camera.local:5678", NetMode::RawTcp).unwrap(),
            network("camera.local", 5678, NetMode::RawTcp)
        );
    }

    #[test]
    fn test_scheme_overrides_mode() {
        assert_eq!(
            Endpoint::parse("rfc2217://host:1", NetMode::RawTcp).unwrap().kind(),
            LinkKind::Rfc2217
        );
        assert_eq!(
            Endpoint::parse("tcp://host:1", NetMode::Rfc2217).unwrap().kind(),
            LinkKind::RawTcp
        );
    }

    #[test]
    fn test_ipv6() {
        let endpoint = Endpoint::parse("[::1]:8234", NetMode::RawTcp).unwrap();
        assert_eq!(endpoint, network("::1", 8234, NetMode::RawTcp));
        assert_eq!(endpoint.to_string(), "socket://[::1]:8234");
        assert!(Endpoint::parse("::1:8234", NetMode::RawTcp).is_err());
    }

    #[test]
    fn test_rejected() {
        for bad in ["", ":8234", "host", "host:", "host:abc", "host:0", "host:70000", "ftp://host:1", "[::1"] {
            assert!(
                matches!(Endpoint::parse(bad, NetMode::RawTcp), Err(Error::InvalidAddress(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_into_transport_kind() {
        let options = LinkOptions::default();
        for (s, kind) in [
            ("COM4", LinkKind::Serial),
            ("socket://h:1", LinkKind::RawTcp),
            ("h:1", LinkKind::Rfc2217),
        ] {
            let transport = Endpoint::parse(s, NetMode::Rfc2217).unwrap().into_transport(&options);
            assert_eq!(transport.kind(), kind);
            assert!(!transport.is_alive());
        }
    }
}

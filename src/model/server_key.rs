use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use super::{DeviceType, Protocol, PublicKey};

/// Address a device dials to reach the cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    Ip(Ipv4Addr),
    Domain(String),
}

impl ServerAddress {
    /// Domains are stored behind a one-byte length
    pub const MAX_DOMAIN_LENGTH: usize = u8::MAX as usize;
}

impl FromStr for ServerAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(ip) = s.parse::<Ipv4Addr>() {
            return Ok(ServerAddress::Ip(ip));
        }
        if s.is_empty() {
            return Err("address is empty".to_string());
        }
        if !s.is_ascii() || s.contains(char::is_whitespace) {
            return Err(format!("'{s}' is not a valid host name"));
        }
        if s.len() > Self::MAX_DOMAIN_LENGTH {
            return Err(format!(
                "host name is {} characters, at most {} fit",
                s.len(),
                Self::MAX_DOMAIN_LENGTH
            ));
        }
        Ok(ServerAddress::Domain(s.to_string()))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerAddress::Ip(ip) => write!(f, "{ip}"),
            ServerAddress::Domain(domain) => f.write_str(domain),
        }
    }
}

/// The cloud's identity as a device will trust it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyRecord {
    pub server_public_key: PublicKey,
    pub address: ServerAddress,
    /// `None` means the device uses the protocol's default port
    pub port: Option<u16>,
    pub protocol: Protocol,
    pub device_type: Option<DeviceType>,
}

impl ServerKeyRecord {
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// `udp://$id.udp.particle.io:5684` style summary
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.protocol,
            self.address,
            self.effective_port()
        )
    }
}

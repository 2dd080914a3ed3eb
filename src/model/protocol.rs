use std::fmt;

use super::KeyAlgorithm;

/// Transport protocol a device uses to reach the cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub const ALL: [Protocol; 2] = [Protocol::Tcp, Protocol::Udp];

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }

    /// Key algorithm used by device and server keys on this protocol
    pub fn algorithm(self) -> KeyAlgorithm {
        match self {
            Protocol::Tcp => KeyAlgorithm::Rsa,
            Protocol::Udp => KeyAlgorithm::Ec,
        }
    }

    pub fn for_algorithm(algorithm: KeyAlgorithm) -> Self {
        match algorithm {
            KeyAlgorithm::Rsa => Protocol::Tcp,
            KeyAlgorithm::Ec => Protocol::Udp,
        }
    }

    /// Port the device connects to when the server record has none
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Tcp => 5683,
            Protocol::Udp => 5684,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use std::fmt;

use super::Protocol;

/// Logical flash slot on a device
///
/// Key slots exist once per protocol because TCP and UDP keys live in
/// separate regions. The transport flag is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    DevicePrivateKey(Protocol),
    DevicePublicKey(Protocol),
    ServerPublicKey(Protocol),
    TransportProtocol,
}

impl Slot {
    pub fn protocol(self) -> Option<Protocol> {
        match self {
            Slot::DevicePrivateKey(p) | Slot::DevicePublicKey(p) | Slot::ServerPublicKey(p) => {
                Some(p)
            }
            Slot::TransportProtocol => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::DevicePrivateKey(p) => write!(f, "{p} device private key"),
            Slot::DevicePublicKey(p) => write!(f, "{p} device public key"),
            Slot::ServerPublicKey(p) => write!(f, "{p} server public key"),
            Slot::TransportProtocol => f.write_str("transport protocol flag"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_protocol() {
        assert_eq!(
            Slot::ServerPublicKey(Protocol::Udp).protocol(),
            Some(Protocol::Udp)
        );
        assert_eq!(Slot::TransportProtocol.protocol(), None);
    }

    #[test]
    fn test_slot_display() {
        assert_eq!(
            Slot::DevicePrivateKey(Protocol::Tcp).to_string(),
            "tcp device private key"
        );
    }
}

//! Binary layouts of the key slots
//!
//! Key slots hold a single DER structure followed by erased flash (0xFF).
//! The server key slot additionally carries the cloud address at a fixed
//! offset behind the key:
//!
//! ```text
//! | server public key (SPKI DER) | 0xFF .. | type | len | address | port (BE) | 0xFF .. |
//!                                          ^ 384 for TCP, 192 for UDP
//! ```
//!
//! Address type 0 is an IPv4 address, type 1 a host name. A port of
//! 0xFFFF means the protocol default.

use std::net::Ipv4Addr;

use super::layout::{self, SlotRegion};
use crate::error::CodecError;
use crate::model::{
    DeviceType, KeyPair, Protocol, PublicKey, ServerAddress, ServerKeyRecord, Slot,
};

/// Value of erased flash
pub const ERASED: u8 = 0xFF;

const ADDRESS_TYPE_IP: u8 = 0;
const ADDRESS_TYPE_DOMAIN: u8 = 1;
const NO_PORT: u16 = 0xFFFF;

const TRANSPORT_TCP: u8 = 0x00;
const TRANSPORT_UDP: u8 = 0x01;

/// Offset of the address block inside a server key slot
pub fn server_address_offset(protocol: Protocol) -> usize {
    match protocol {
        Protocol::Tcp => 384,
        Protocol::Udp => 192,
    }
}

pub fn encode_key_pair(
    pair: &KeyPair,
    device_type: DeviceType,
) -> Result<Vec<u8>, CodecError> {
    let slot = Slot::DevicePrivateKey(pair.protocol());
    let region = layout::region_for(device_type, slot)?;
    pad(pair.private_der(), region, slot)
}

/// Decode the private key slot of `protocol`
pub fn decode_key_pair(
    bytes: &[u8],
    protocol: Protocol,
    device_type: DeviceType,
) -> Result<KeyPair, CodecError> {
    let slot = Slot::DevicePrivateKey(protocol);
    let region = layout::region_for(device_type, slot)?;
    check_length(bytes, region, slot)?;
    let der = der_element(bytes, slot)?;
    KeyPair::from_private_der(protocol.algorithm(), der).map_err(|err| {
        CodecError::MalformedKeyData {
            reason: format!("{slot}: {err}"),
        }
    })
}

pub fn encode_public_key(
    key: &PublicKey,
    device_type: DeviceType,
) -> Result<Vec<u8>, CodecError> {
    let slot = Slot::DevicePublicKey(Protocol::for_algorithm(key.algorithm()));
    let region = layout::region_for(device_type, slot)?;
    pad(key.as_der(), region, slot)
}

pub fn decode_public_key(
    bytes: &[u8],
    protocol: Protocol,
    device_type: DeviceType,
) -> Result<PublicKey, CodecError> {
    let slot = Slot::DevicePublicKey(protocol);
    let region = layout::region_for(device_type, slot)?;
    check_length(bytes, region, slot)?;
    let key = decode_spki(bytes, slot)?;
    if key.algorithm() != protocol.algorithm() {
        return Err(CodecError::MalformedKeyData {
            reason: format!("{slot} holds a {} key", key.algorithm()),
        });
    }
    Ok(key)
}

pub fn encode_server_key_record(
    record: &ServerKeyRecord,
    device_type: DeviceType,
) -> Result<Vec<u8>, CodecError> {
    let protocol = record.protocol;
    let algorithm = record.server_public_key.algorithm();
    if algorithm != protocol.algorithm() {
        return Err(CodecError::AlgorithmMismatch {
            algorithm: algorithm.to_string(),
            protocol: protocol.to_string(),
        });
    }

    let slot = Slot::ServerPublicKey(protocol);
    let region = layout::region_for(device_type, slot)?;
    let offset = server_address_offset(protocol);
    let key = record.server_public_key.as_der();
    if key.len() > offset {
        return Err(CodecError::MalformedKeyData {
            reason: format!(
                "{} byte server key overruns the address block at {offset}",
                key.len()
            ),
        });
    }

    let (address_type, address) = match &record.address {
        ServerAddress::Ip(ip) => (ADDRESS_TYPE_IP, ip.octets().to_vec()),
        ServerAddress::Domain(domain) => (ADDRESS_TYPE_DOMAIN, domain.as_bytes().to_vec()),
    };
    let address_len = u8::try_from(address.len()).map_err(|_| CodecError::InvalidAddress {
        reason: format!("{} byte address does not fit", address.len()),
    })?;
    let port = match record.port {
        Some(NO_PORT) => {
            return Err(CodecError::InvalidAddress {
                reason: format!("port {NO_PORT} is reserved"),
            })
        }
        Some(port) => port,
        None => NO_PORT,
    };

    let end = offset + 2 + address.len() + 2;
    if end > region.length {
        return Err(CodecError::InvalidAddress {
            reason: format!(
                "address needs {} bytes, {slot} has {}",
                end - offset,
                region.length - offset
            ),
        });
    }

    let mut image = vec![ERASED; region.length];
    image[..key.len()].copy_from_slice(key);
    image[offset] = address_type;
    image[offset + 1] = address_len;
    image[offset + 2..offset + 2 + address.len()].copy_from_slice(&address);
    image[end - 2..end].copy_from_slice(&port.to_be_bytes());
    Ok(image)
}

/// Decode a server key slot; the protocol follows from the key algorithm
pub fn decode_server_key_record(
    bytes: &[u8],
    device_type: DeviceType,
) -> Result<ServerKeyRecord, CodecError> {
    let device_layout = layout::layout(device_type)?;
    let key = decode_spki(bytes, Slot::ServerPublicKey(device_layout.default_protocol))?;
    let protocol = Protocol::for_algorithm(key.algorithm());
    let slot = Slot::ServerPublicKey(protocol);
    let region = device_layout.region(device_type, slot)?;
    check_length(bytes, region, slot)?;

    let offset = server_address_offset(protocol);
    let header = bytes
        .get(offset..offset + 2)
        .ok_or_else(|| truncated(slot))?;
    let (address_type, address_len) = (header[0], usize::from(header[1]));

    let decoded = match address_type {
        ADDRESS_TYPE_IP | ADDRESS_TYPE_DOMAIN => {
            let start = offset + 2;
            let raw = bytes
                .get(start..start + address_len)
                .ok_or_else(|| truncated(slot))?;
            let port_bytes = bytes
                .get(start + address_len..start + address_len + 2)
                .ok_or_else(|| truncated(slot))?;
            let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
            let address = decode_address(address_type, raw, slot)?;
            Some((address, (port != NO_PORT).then_some(port)))
        }
        _ => None,
    };

    let (address, port) = match decoded {
        Some(found) => found,
        None => {
            let host = device_layout.default_server(protocol).ok_or_else(|| {
                CodecError::UnsupportedProtocol {
                    device: device_type.to_string(),
                    feature: format!("the {protocol} protocol"),
                }
            })?;
            (ServerAddress::Domain(host.to_string()), None)
        }
    };

    Ok(ServerKeyRecord {
        server_public_key: key,
        address,
        port,
        protocol,
        device_type: Some(device_type),
    })
}

pub fn encode_transport_flag(protocol: Protocol) -> Vec<u8> {
    match protocol {
        Protocol::Tcp => vec![TRANSPORT_TCP],
        Protocol::Udp => vec![TRANSPORT_UDP],
    }
}

/// Decode the transport flag; erased flash selects the device default
pub fn decode_transport_flag(bytes: &[u8], device_type: DeviceType) -> Result<Protocol, CodecError> {
    match bytes {
        [TRANSPORT_TCP] => Ok(Protocol::Tcp),
        [TRANSPORT_UDP] => Ok(Protocol::Udp),
        [ERASED] => Ok(layout::layout(device_type)?.default_protocol),
        other => Err(CodecError::MalformedKeyData {
            reason: format!(
                "{} holds unexpected value {}",
                Slot::TransportProtocol,
                hex::encode(other)
            ),
        }),
    }
}

/// The DER SEQUENCE at the start of `bytes`, without trailing padding
pub fn der_element(bytes: &[u8], slot: Slot) -> Result<&[u8], CodecError> {
    match bytes.first() {
        Some(0x30) => {}
        Some(&ERASED) => {
            return Err(CodecError::MalformedKeyData {
                reason: format!("{slot} is blank"),
            })
        }
        _ => {
            return Err(CodecError::MalformedKeyData {
                reason: format!("{slot} does not start with a DER sequence"),
            })
        }
    }

    let (header, len) = match bytes.get(1).copied() {
        Some(len @ 0..=0x7F) => (2, usize::from(len)),
        Some(0x81) => (3, usize::from(*bytes.get(2).ok_or_else(|| truncated(slot))?)),
        Some(0x82) => {
            let len = bytes.get(2..4).ok_or_else(|| truncated(slot))?;
            (4, usize::from(u16::from_be_bytes([len[0], len[1]])))
        }
        Some(other) => {
            return Err(CodecError::MalformedKeyData {
                reason: format!("{slot} has unsupported DER length byte {other:#04x}"),
            })
        }
        None => return Err(truncated(slot)),
    };

    bytes.get(..header + len).ok_or_else(|| truncated(slot))
}

fn decode_spki(bytes: &[u8], slot: Slot) -> Result<PublicKey, CodecError> {
    let der = der_element(bytes, slot)?;
    PublicKey::from_der(der).map_err(|err| CodecError::MalformedKeyData {
        reason: format!("{slot}: {err}"),
    })
}

fn decode_address(address_type: u8, raw: &[u8], slot: Slot) -> Result<ServerAddress, CodecError> {
    if address_type == ADDRESS_TYPE_IP {
        let octets: [u8; 4] = raw.try_into().map_err(|_| CodecError::MalformedKeyData {
            reason: format!("{slot} has a {} byte IPv4 address", raw.len()),
        })?;
        return Ok(ServerAddress::Ip(Ipv4Addr::from(octets)));
    }
    let domain = std::str::from_utf8(raw).map_err(|_| CodecError::MalformedKeyData {
        reason: format!("{slot} host name is not text"),
    })?;
    Ok(ServerAddress::Domain(domain.to_string()))
}

fn pad(data: &[u8], region: SlotRegion, slot: Slot) -> Result<Vec<u8>, CodecError> {
    if data.len() > region.length {
        return Err(CodecError::MalformedKeyData {
            reason: format!(
                "{} bytes do not fit in {slot} ({} bytes)",
                data.len(),
                region.length
            ),
        });
    }
    let mut image = vec![ERASED; region.length];
    image[..data.len()].copy_from_slice(data);
    Ok(image)
}

fn check_length(bytes: &[u8], region: SlotRegion, slot: Slot) -> Result<(), CodecError> {
    if bytes.len() != region.length {
        return Err(CodecError::MalformedKeyData {
            reason: format!(
                "{slot} is {} bytes, expected {}",
                bytes.len(),
                region.length
            ),
        });
    }
    Ok(())
}

fn truncated(slot: Slot) -> CodecError {
    CodecError::MalformedKeyData {
        reason: format!("{slot} is truncated"),
    }
}

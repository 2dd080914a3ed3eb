//! Inspect the server address and transport protocol on the device

use std::io::Write;

use tracing::info;

use super::flash::{active_protocol, ensure_supported, verify_slot};
use crate::error::{CodecError, DfuKeysResult};
use crate::logic::{codec, layout};
use crate::model::{Protocol, ServerKeyRecord, Slot};
use crate::ports::DfuTransport;

/// Print the `proto://host:port` the device dials for its active protocol
pub fn server_address<T: DfuTransport>(
    transport: &T,
    out: &mut impl Write,
) -> DfuKeysResult<ServerKeyRecord> {
    let device = transport.find_first()?;
    let device_type = device.require_type()?;
    let protocol = active_protocol(transport, &device)?;

    let bytes = transport.read_slot(&device, Slot::ServerPublicKey(protocol))?;
    let record = codec::decode_server_key_record(&bytes, device_type)?;

    writeln!(out, "{}", record.url())?;
    Ok(record)
}

/// Report the transport protocol, switching it first when `switch_to` is set
pub fn transport_protocol<T: DfuTransport>(
    transport: &T,
    switch_to: Option<Protocol>,
    out: &mut impl Write,
) -> DfuKeysResult<Protocol> {
    let device = transport.find_first()?;
    let device_type = device.require_type()?;
    let current = active_protocol(transport, &device)?;

    let Some(protocol) = switch_to else {
        writeln!(out, "Device protocol is set to {current}")?;
        return Ok(current);
    };

    if !layout::layout(device_type)?.can_switch_protocol() {
        return Err(CodecError::UnsupportedProtocol {
            device: device_type.to_string(),
            feature: "protocol switching".to_string(),
        }
        .into());
    }
    ensure_supported(device_type, protocol)?;

    let flag = codec::encode_transport_flag(protocol);
    transport.write_slot(&device, Slot::TransportProtocol, &flag)?;
    verify_slot(transport, &device, Slot::TransportProtocol, &flag)?;
    info!(%device, from = %current, to = %protocol, "Switched transport protocol");

    writeln!(out, "Protocol switched to {protocol}")?;
    Ok(protocol)
}

//! Public API: the closed set of provisioning operations
//!
//! Callers build an [`Operation`] and hand it to [`Session::execute`], which
//! dispatches to the matching use case.

use std::io::Write;
use std::path::PathBuf;

use tracing::debug;

use crate::adapters::{DfuUtil, FileKeyStore, HttpCloudRegistrar};
use crate::config::Settings;
use crate::error::DfuKeysResult;
use crate::model::{DeviceId, Protocol};
use crate::ports::{CloudRegistrar, DfuTransport, KeyStore};
use crate::use_cases::{
    doctor, load_keys, new_keys, save_keys, send_key, server_address, server_key,
    transport_protocol, CancelFlag, DoctorOptions, NewKeysOptions, SaveKeysOptions,
    ServerKeyOptions, ServerKeys,
};

/// One provisioning operation with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    New(NewKeysOptions),
    Save(SaveKeysOptions),
    Load {
        filename: PathBuf,
    },
    Send {
        device_id: DeviceId,
        filename: PathBuf,
        product_id: Option<String>,
    },
    Server(ServerKeyOptions),
    Address,
    Protocol {
        switch_to: Option<Protocol>,
    },
    Doctor(DoctorOptions),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::New(_) => "new",
            Operation::Save(_) => "save",
            Operation::Load { .. } => "load",
            Operation::Send { .. } => "send",
            Operation::Server(_) => "server",
            Operation::Address => "address",
            Operation::Protocol { .. } => "protocol",
            Operation::Doctor(_) => "doctor",
        }
    }

    /// Prefix shown in front of the error when the operation fails
    pub fn failure_context(&self) -> &'static str {
        match self {
            Operation::New(_) => "Error creating keys",
            Operation::Save(_) => "Error saving key from device",
            Operation::Load { .. } => "Error writing key to device",
            Operation::Send { .. } => "Error sending public key to server",
            Operation::Server(_) => "Error writing server key",
            Operation::Address => "Error reading server address",
            Operation::Protocol { .. } => "Error reading transport protocol",
            Operation::Doctor(_) => "Error fixing device keys",
        }
    }
}

/// Collaborators one CLI invocation works with
#[derive(Debug)]
pub struct Session<T, C, S> {
    pub transport: T,
    pub cloud: C,
    pub store: S,
    pub server_keys: ServerKeys,
    pub cancel: CancelFlag,
}

/// Session talking to real hardware through `dfu-util` and to the cloud API
pub type DefaultSession = Session<DfuUtil, HttpCloudRegistrar, FileKeyStore>;

impl DefaultSession {
    pub fn from_settings(settings: &Settings) -> DfuKeysResult<Self> {
        let store = FileKeyStore::new();
        Ok(Session {
            transport: DfuUtil::new(settings.dfu_util.clone(), settings.dfu_timeout()),
            cloud: HttpCloudRegistrar::new(
                settings.api_url.clone(),
                settings.access_token.clone(),
                settings.http_timeout(),
            )?,
            server_keys: settings.server_keys(&store)?,
            store,
            cancel: CancelFlag::new(),
        })
    }
}

impl<T, C, S> Session<T, C, S>
where
    T: DfuTransport,
    C: CloudRegistrar,
    S: KeyStore,
{
    /// Run `operation`, writing progress and result lines to `out`
    pub fn execute(&self, operation: &Operation, out: &mut impl Write) -> DfuKeysResult<()> {
        debug!(operation = operation.name(), "Executing operation");
        match operation {
            Operation::New(options) => {
                new_keys(&self.transport, &self.store, options, out)?;
            }
            Operation::Save(options) => {
                save_keys(&self.transport, &self.store, options, out)?;
            }
            Operation::Load { filename } => {
                load_keys(&self.transport, &self.store, filename, out)?;
            }
            Operation::Send {
                device_id,
                filename,
                product_id,
            } => {
                send_key(
                    &self.cloud,
                    &self.store,
                    device_id,
                    filename,
                    product_id.as_deref(),
                    out,
                )?;
            }
            Operation::Server(options) => {
                server_key(&self.transport, &self.store, &self.server_keys, options, out)?;
            }
            Operation::Address => {
                server_address(&self.transport, out)?;
            }
            Operation::Protocol { switch_to } => {
                transport_protocol(&self.transport, *switch_to, out)?;
            }
            Operation::Doctor(options) => {
                doctor(
                    &self.transport,
                    &self.cloud,
                    &self.store,
                    options,
                    &self.cancel,
                    out,
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fake_cloud::FakeCloud;
    use crate::adapters::fake_dfu::FakeDfu;
    use crate::model::DeviceType;

    fn session(device_type: Option<DeviceType>) -> Session<FakeDfu, FakeCloud, FileKeyStore> {
        Session {
            transport: device_type.map_or_else(FakeDfu::empty, FakeDfu::with_device),
            cloud: FakeCloud::new(),
            store: FileKeyStore::new(),
            server_keys: ServerKeys::builtin().unwrap(),
            cancel: CancelFlag::new(),
        }
    }

    #[test]
    fn test_every_operation_has_a_context() {
        let operations = [
            Operation::New(NewKeysOptions::default()),
            Operation::Save(SaveKeysOptions::default()),
            Operation::Load {
                filename: PathBuf::from("device.pem"),
            },
            Operation::Send {
                device_id: DeviceId::new("0123456789abcdef01234567").unwrap(),
                filename: PathBuf::from("device.pem"),
                product_id: None,
            },
            Operation::Server(ServerKeyOptions::default()),
            Operation::Address,
            Operation::Protocol { switch_to: None },
            Operation::Doctor(DoctorOptions::new(
                DeviceId::new("0123456789abcdef01234567").unwrap(),
            )),
        ];

        for operation in &operations {
            assert!(operation.failure_context().starts_with("Error "));
        }
        let names: std::collections::HashSet<_> = operations.iter().map(Operation::name).collect();
        assert_eq!(names.len(), operations.len());
    }

    #[test]
    fn test_dispatch_protocol_switch() {
        let session = session(Some(DeviceType::Photon));
        let mut out = Vec::new();

        session
            .execute(
                &Operation::Protocol {
                    switch_to: Some(Protocol::Udp),
                },
                &mut out,
            )
            .unwrap();
        session
            .execute(&Operation::Protocol { switch_to: None }, &mut out)
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Protocol switched to udp\nDevice protocol is set to udp\n"
        );
    }

    #[test]
    fn test_dispatch_server_then_address() {
        let session = session(Some(DeviceType::Electron));
        let mut out = Vec::new();

        session
            .execute(&Operation::Server(ServerKeyOptions::default()), &mut out)
            .unwrap();
        session.execute(&Operation::Address, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("udp://$id.udp.particle.io:5684\n"), "{text}");
    }

    #[test]
    fn test_dispatch_surfaces_device_absence() {
        let session = session(None);
        let err = session
            .execute(&Operation::Address, &mut Vec::new())
            .unwrap_err();
        assert!(err.is_device_not_found());
    }
}

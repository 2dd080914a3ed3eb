//! Doctor: regenerate, install and register device keys in one transaction
//!
//! The steps run in `DoctorStep::SEQUENCE`. A failing step stops the run
//! and is reported together with the steps that already took effect; the
//! only exception is the backup of the old key, which is skipped with a
//! warning. Nothing is rolled back.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::flash::{install_key_pair, resolve_protocol, verify_key_pair};
use super::save_keys::read_device_public_key;
use super::send_key::register_with_cloud;
use crate::error::{CodecError, DeviceError, DfuKeysError, DfuKeysResult};
use crate::logic::generate_key_pair;
use crate::model::{DeviceId, DoctorStep, KeyPair, Protocol, ProvisioningTransaction};
use crate::ports::{CloudRegistrar, DeviceHandle, DfuTransport, KeyStore};

/// Shared interrupt request, checked between doctor steps
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorOptions {
    pub device_id: DeviceId,
    pub protocol: Option<Protocol>,
    pub product_id: Option<String>,
    /// Directory receiving `<id>_new.*` and `<id>_old.*`
    pub key_dir: PathBuf,
}

impl DoctorOptions {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            protocol: None,
            product_id: None,
            key_dir: PathBuf::from("."),
        }
    }

    fn key_base(&self, suffix: &str) -> PathBuf {
        self.key_dir.join(format!("{}_{suffix}", self.device_id))
    }
}

/// State carried from one step to the next
struct DoctorRun<'a, T, C, S> {
    transport: &'a T,
    cloud: &'a C,
    store: &'a S,
    options: &'a DoctorOptions,
    device: Option<DeviceHandle>,
    protocol: Option<Protocol>,
    pair: Option<KeyPair>,
}

impl<T, C, S> DoctorRun<'_, T, C, S>
where
    T: DfuTransport,
    C: CloudRegistrar,
    S: KeyStore,
{
    fn device(&self) -> DfuKeysResult<&DeviceHandle> {
        self.device.as_ref().ok_or_else(|| DeviceError::NotFound.into())
    }

    fn pair(&self) -> DfuKeysResult<&KeyPair> {
        self.pair.as_ref().ok_or_else(|| {
            CodecError::KeyGeneration {
                reason: "no key pair was created".to_string(),
            }
            .into()
        })
    }

    fn protocol(&self) -> DfuKeysResult<Protocol> {
        match self.protocol {
            Some(protocol) => Ok(protocol),
            None => resolve_protocol(self.transport, self.device()?, self.options.protocol),
        }
    }

    fn run_step(&mut self, step: DoctorStep, out: &mut impl Write) -> DfuKeysResult<()> {
        match step {
            DoctorStep::FindDevice => {
                let device = self.transport.find_first()?;
                self.protocol = Some(resolve_protocol(
                    self.transport,
                    &device,
                    self.options.protocol,
                )?);
                self.device = Some(device);
            }
            DoctorStep::CreateKeys => {
                let pair = generate_key_pair(self.protocol()?)?;
                self.store
                    .write_key_pair(&pair, &self.options.key_base("new"), true)?;
                self.pair = Some(pair);
                writeln!(out, "New Key Created!")?;
            }
            DoctorStep::SaveOldKeys => {
                let key = read_device_public_key(self.transport, self.device()?, self.protocol()?)?;
                self.store
                    .write_public_key(&key, &self.options.key_base("old"), true)?;
                writeln!(out, "Saved!")?;
            }
            DoctorStep::LoadNewKeys => {
                install_key_pair(self.transport, self.device()?, self.pair()?)?;
                writeln!(out, "Saved!")?;
            }
            DoctorStep::RegisterKey => {
                register_with_cloud(
                    self.cloud,
                    &self.options.device_id,
                    self.pair()?.public(),
                    self.options.product_id.as_deref(),
                    out,
                )?;
            }
            DoctorStep::Confirm => {
                let device = self.device()?;
                verify_key_pair(self.transport, device, self.pair()?)?;
                if let Err(err) = self.transport.leave(device) {
                    warn!(%device, error = %err, "Device did not leave DFU mode");
                }
                writeln!(out, "Okay!  New keys in place, your device should restart.")?;
            }
        }
        Ok(())
    }
}

/// Run the doctor transaction against the first DFU device
///
/// Returns the installed key pair together with the transaction record.
pub fn doctor<T, C, S>(
    transport: &T,
    cloud: &C,
    store: &S,
    options: &DoctorOptions,
    cancel: &CancelFlag,
    out: &mut impl Write,
) -> DfuKeysResult<(KeyPair, ProvisioningTransaction)>
where
    T: DfuTransport,
    C: CloudRegistrar,
    S: KeyStore,
{
    let mut run = DoctorRun {
        transport,
        cloud,
        store,
        options,
        device: None,
        protocol: None,
        pair: None,
    };
    let mut transaction = ProvisioningTransaction::new();

    for step in DoctorStep::SEQUENCE {
        if cancel.is_cancelled() {
            warn!(next = %step, "Doctor interrupted");
            return Err(DfuKeysError::Interrupted {
                next: step,
                completed: transaction.completed().to_vec(),
            });
        }

        debug!(%step, "Doctor step");
        match run.run_step(step, out) {
            Ok(()) => transaction.complete(step),
            // an interrupt also reaches a running dfu-util and fails the step
            Err(err) if cancel.is_cancelled() => {
                warn!(%step, error = %err, "Doctor interrupted during step");
                return Err(DfuKeysError::Interrupted {
                    next: step,
                    completed: transaction.completed().to_vec(),
                });
            }
            Err(err) if step.is_best_effort() => {
                warn!(%step, error = %err, "Skipping best-effort step");
                transaction.skip(step, err.to_string());
            }
            Err(err) => {
                return Err(DfuKeysError::Transaction {
                    step,
                    completed: transaction.completed().to_vec(),
                    source: Box::new(err),
                });
            }
        }
    }

    let pair = run.pair()?.clone();
    info!(device_id = %options.device_id, "Doctor finished");
    Ok((pair, transaction))
}

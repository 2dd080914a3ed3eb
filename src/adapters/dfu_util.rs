//! DFU transport backed by the `dfu-util` command line utility
//!
//! Every transfer is one `dfu-util` invocation. The child is polled until
//! it exits or the timeout passes, in which case it is killed; a stuck USB
//! transfer can therefore never block the caller indefinitely.

use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{DeviceError, DfuKeysResult};
use crate::logic::SlotRegion;
use crate::ports::{DeviceHandle, DfuTransport};

pub const DEFAULT_PROGRAM: &str = "dfu-util";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const NO_DEVICE_MARKER: &str = "No DFU capable USB device available";
const LISTING_PREFIX: &str = "Found DFU: [";

/// `dfu-util` driven transport
#[derive(Debug, Clone)]
pub struct DfuUtil {
    program: String,
    timeout: Duration,
}

struct Finished {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl Default for DfuUtil {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM, DEFAULT_TIMEOUT)
    }
}

impl DfuUtil {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn run(&self, operation: &str, args: &[String]) -> DfuKeysResult<Finished> {
        debug!(program = %self.program, ?args, "Running DFU utility");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| DeviceError::ToolUnavailable {
                program: self.program.clone(),
                reason: match err.kind() {
                    io::ErrorKind::NotFound => "not found on PATH".to_string(),
                    _ => err.to_string(),
                },
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = self.wait(&mut child, operation)?;

        let finished = Finished {
            status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        };

        if finished.stderr.contains(NO_DEVICE_MARKER) || finished.stdout.contains(NO_DEVICE_MARKER)
        {
            return Err(DeviceError::NotFound.into());
        }
        if !finished.status.success() {
            return Err(DeviceError::TransferFailed {
                operation: operation.to_string(),
                reason: failure_reason(&finished),
            }
            .into());
        }
        Ok(finished)
    }

    fn wait(&self, child: &mut Child, operation: &str) -> DfuKeysResult<ExitStatus> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    warn!(operation, timeout = ?self.timeout, "DFU utility timed out, killing it");
                    if let Err(err) = child.kill() {
                        warn!(error = %err, "Failed to kill DFU utility");
                    }
                    let _ = child.wait();
                    return Err(DeviceError::Timeout {
                        operation: operation.to_string(),
                        seconds: self.timeout.as_secs(),
                    }
                    .into());
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(err) => {
                    return Err(DeviceError::TransferFailed {
                        operation: operation.to_string(),
                        reason: err.to_string(),
                    }
                    .into())
                }
            }
        }
    }
}

impl DfuTransport for DfuUtil {
    fn list_dfu_devices(&self) -> DfuKeysResult<Vec<DeviceHandle>> {
        let finished = self.run("list", &["-l".to_string()])?;
        let devices = parse_listing(&finished.stdout);
        debug!(count = devices.len(), "Enumerated DFU devices");
        Ok(devices)
    }

    fn upload(&self, device: &DeviceHandle, region: SlotRegion) -> DfuKeysResult<Vec<u8>> {
        let dir = scratch_dir("upload")?;
        let file = dir.path().join("slot.bin");

        let mut args = target_args(device, region);
        args.extend([
            "-s".to_string(),
            format!("{:#x}:{}", region.offset, region.length),
            "-U".to_string(),
            file.display().to_string(),
        ]);
        self.run("upload", &args)?;

        fs::read(&file).map_err(|err| {
            DeviceError::TransferFailed {
                operation: "upload".to_string(),
                reason: format!("no data received: {err}"),
            }
            .into()
        })
    }

    fn download(
        &self,
        device: &DeviceHandle,
        region: SlotRegion,
        data: &[u8],
    ) -> DfuKeysResult<()> {
        let dir = scratch_dir("download")?;
        let file = dir.path().join("slot.bin");
        write_scratch(&file, data)?;

        let mut args = target_args(device, region);
        args.extend([
            "-s".to_string(),
            format!("{:#x}", region.offset),
            "-D".to_string(),
            file.display().to_string(),
        ]);
        self.run("download", &args)?;
        info!(%device, offset = region.offset, bytes = data.len(), "Wrote flash region");
        Ok(())
    }

    fn leave(&self, device: &DeviceHandle) -> DfuKeysResult<()> {
        let args = vec![
            "-d".to_string(),
            device.usb_id(),
            "-p".to_string(),
            device.path.clone(),
            "-e".to_string(),
        ];
        self.run("leave", &args)?;
        info!(%device, "Device left DFU mode");
        Ok(())
    }
}

/// Parse `dfu-util -l` output into one handle per physical device
///
/// `dfu-util` prints one line per alternate setting; devices are told apart
/// by USB id and bus path.
pub fn parse_listing(output: &str) -> Vec<DeviceHandle> {
    let mut devices: Vec<DeviceHandle> = Vec::new();
    for line in output.lines() {
        let Some(rest) = line.trim().strip_prefix(LISTING_PREFIX) else {
            continue;
        };
        let Some((usb_id, _)) = rest.split_once(']') else {
            continue;
        };
        let Some((vendor_id, product_id)) = usb_id.split_once(':') else {
            continue;
        };
        let (Ok(vendor_id), Ok(product_id)) = (
            u16::from_str_radix(vendor_id.trim(), 16),
            u16::from_str_radix(product_id.trim(), 16),
        ) else {
            continue;
        };
        let path = quoted_field(line, "path").unwrap_or_default();

        let mut device = DeviceHandle::new(vendor_id, product_id, path);
        if let Some(serial) = quoted_field(line, "serial").filter(|s| !s.is_empty()) {
            device = device.with_serial(serial);
        }

        let known = devices.iter().any(|d| {
            d.vendor_id == device.vendor_id
                && d.product_id == device.product_id
                && d.path == device.path
        });
        if !known {
            devices.push(device);
        }
    }
    devices
}

fn quoted_field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let marker = format!("{key}=\"");
    let start = line.find(&marker)? + marker.len();
    let len = line[start..].find('"')?;
    Some(&line[start..start + len])
}

fn target_args(device: &DeviceHandle, region: SlotRegion) -> Vec<String> {
    let mut args = vec![
        "-d".to_string(),
        device.usb_id(),
        "-a".to_string(),
        region.alt.to_string(),
    ];
    if !device.path.is_empty() {
        args.extend(["-p".to_string(), device.path.clone()]);
    }
    args
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let mut bytes = Vec::new();
            if pipe.read_to_end(&mut bytes).is_ok() {
                text = String::from_utf8_lossy(&bytes).into_owned();
            }
        }
        text
    })
}

fn failure_reason(finished: &Finished) -> String {
    finished
        .stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| finished.status.to_string())
}

fn scratch_dir(operation: &str) -> DfuKeysResult<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix("dfukeys-")
        .tempdir()
        .map_err(|err| {
            DeviceError::TransferFailed {
                operation: operation.to_string(),
                reason: format!("no scratch directory: {err}"),
            }
            .into()
        })
}

fn write_scratch(file: &Path, data: &[u8]) -> DfuKeysResult<()> {
    fs::write(file, data).map_err(|err| {
        DeviceError::TransferFailed {
            operation: "download".to_string(),
            reason: format!("cannot stage data: {err}"),
        }
        .into()
    })
}

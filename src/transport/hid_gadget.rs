//! Wired transport through the Linux USB gadget HID function (`/dev/hidgN`),
//! with link status taken from the UDC sysfs `state` attribute.

use super::report::split_report;
use super::{Transport, TransportError, WheelReport, WiredSettings};
use crate::link::{LinkBinding, LinkCoordinator, TransportId, TransportKind, WiredStatus};
use crate::scroll::FeatureOutcome;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[cfg(any(target_arch = "mips", target_arch = "mips64"))]
const O_NONBLOCK: i32 = 0o200;
#[cfg(any(target_arch = "sparc", target_arch = "sparc64"))]
const O_NONBLOCK: i32 = 0x4000;
#[cfg(not(any(
    target_arch = "mips",
    target_arch = "mips64",
    target_arch = "sparc",
    target_arch = "sparc64"
)))]
const O_NONBLOCK: i32 = 0o4000;

const UDC_CLASS_DIR: &str = "/sys/class/udc";
// Largest output report f_hid hands to userspace in one read.
const HOST_REPORT_MAX: usize = 64;

pub struct HidGadgetTransport {
    name: String,
    device: File,
    udc_dir: Option<PathBuf>,
}

impl HidGadgetTransport {
    /// Opens the gadget device without blocking so a report the host has not
    /// collected yet surfaces as [`TransportError::Busy`].
    pub fn open(settings: &WiredSettings, udc_dir: Option<PathBuf>) -> Result<Self, TransportError> {
        let device = OpenOptions::new()
            .write(true)
            .custom_flags(O_NONBLOCK)
            .open(&settings.device)
            .map_err(|e| {
                TransportError::InitializationError(format!(
                    "{}: {}",
                    settings.device.display(),
                    e
                ))
            })?;
        info!("Opened HID gadget {}", settings.device.display());

        Ok(Self {
            name: format!("usb:{}", settings.device.display()),
            device,
            udc_dir,
        })
    }
}

impl Transport for HidGadgetTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Wired
    }

    fn send_scroll_report(&self, report: &WheelReport) -> Result<(), TransportError> {
        let bytes = report.to_bytes();
        let mut device = &self.device;
        match device.write(&bytes) {
            Ok(written) if written == bytes.len() => Ok(()),
            Ok(written) => Err(TransportError::Io(std::io::Error::new(
                ErrorKind::WriteZero,
                format!("short report write ({written} of {} bytes)", bytes.len()),
            ))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(TransportError::Busy),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn request_wakeup(&self) -> Result<(), TransportError> {
        let Some(udc_dir) = &self.udc_dir else {
            debug!("No UDC known for {}, skipping remote wakeup", self.name);
            return Ok(());
        };
        std::fs::write(udc_dir.join("srp"), "1")?;
        debug!("Remote wakeup signalled on {}", udc_dir.display());
        Ok(())
    }
}

/// Finds the UDC directory named in settings, or the first one present.
pub async fn resolve_udc(settings: &WiredSettings) -> Option<PathBuf> {
    if !settings.udc.is_empty() {
        return Some(Path::new(UDC_CLASS_DIR).join(&settings.udc));
    }

    let mut entries = match tokio::fs::read_dir(UDC_CLASS_DIR).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Unable to list {}: {}", UDC_CLASS_DIR, e);
            return None;
        }
    };
    match entries.next_entry().await {
        Ok(Some(entry)) => {
            info!("Using UDC {}", entry.file_name().to_string_lossy());
            Some(entry.path())
        }
        Ok(None) => {
            warn!("No USB device controller found under {}", UDC_CLASS_DIR);
            None
        }
        Err(e) => {
            warn!("Unable to read {}: {}", UDC_CLASS_DIR, e);
            None
        }
    }
}

/// Maps the kernel's `usb_state_string()` values onto device-controller status codes.
pub fn status_from_udc_state(state: &str) -> Option<WiredStatus> {
    match state.trim() {
        "not attached" => Some(WiredStatus::Disconnected),
        "attached" | "powered" | "reconnecting" | "unauthenticated" | "addressed" => {
            Some(WiredStatus::Connected)
        }
        // Bus reset puts the device back into the default state.
        "default" => Some(WiredStatus::Reset),
        "configured" => Some(WiredStatus::Configured),
        "suspended" => Some(WiredStatus::Suspend),
        _ => None,
    }
}

/// Polls `<udc>/state` and forwards every change to the coordinator.
pub fn spawn_state_poller(
    udc_dir: PathBuf,
    transport: TransportId,
    coordinator: Arc<LinkCoordinator>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let state_path = udc_dir.join("state");
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut last_state = String::new();
        let mut read_failing = false;

        info!("Watching {} for {}", state_path.display(), transport);
        loop {
            interval.tick().await;

            let state = match tokio::fs::read_to_string(&state_path).await {
                Ok(state) => {
                    read_failing = false;
                    state.trim().to_string()
                }
                Err(e) => {
                    if !read_failing {
                        error!("Failed to read {}: {}", state_path.display(), e);
                        read_failing = true;
                    }
                    continue;
                }
            };
            if state == last_state {
                continue;
            }

            debug!("UDC state {:?} -> {:?}", last_state, state);
            match status_from_udc_state(&state) {
                Some(status) => {
                    // Errors are already logged by the coordinator.
                    let _ = coordinator.on_transport_status(transport, status.code());
                }
                None => warn!("Unrecognised UDC state {:?}", state),
            }
            last_state = state;
        }
    })
}

/// Non-blocking reader for reports the host writes to the gadget.
pub struct HostReportReader<T: AsRawFd> {
    fd: AsyncFd<T>,
}

impl HostReportReader<File> {
    pub fn open(device: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(O_NONBLOCK)
            .open(device)?;
        Self::new(file)
    }
}

impl<T> HostReportReader<T>
where
    T: AsRawFd,
    for<'a> &'a T: Read,
{
    /// `inner` must already be in non-blocking mode.
    pub fn new(inner: T) -> io::Result<Self> {
        Ok(Self {
            fd: AsyncFd::new(inner)?,
        })
    }

    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| {
                let mut source = inner.get_ref();
                source.read(buf)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Applies every report until end of stream.
    pub async fn pump(&self, binding: &LinkBinding) -> io::Result<()> {
        let mut buf = [0u8; HOST_REPORT_MAX];
        loop {
            let read = self.read(&mut buf).await?;
            if read == 0 {
                return Ok(());
            }
            apply_host_report(binding, &buf[..read]);
        }
    }
}

/// Applies one report the host wrote to the gadget. The first byte is the
/// report id, the rest its payload.
pub fn apply_host_report(binding: &LinkBinding, bytes: &[u8]) -> Option<FeatureOutcome> {
    let (report_id, payload) = split_report(bytes)?;
    match binding.on_feature_write(report_id, payload) {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!("Ignoring host report {:#04x}: {}", report_id, e);
            None
        }
    }
}

/// Reads host reports from `device` for the lifetime of the task, reopening
/// it after `retry` whenever it goes away.
pub fn spawn_feature_reader(device: PathBuf, binding: LinkBinding, retry: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut read_failing = false;
        info!("Reading host reports from {} for {}", device.display(), binding.transport());
        loop {
            let result = match HostReportReader::open(&device) {
                Ok(reader) => {
                    if read_failing {
                        info!("Host report reader reopened {}", device.display());
                        read_failing = false;
                    }
                    reader.pump(&binding).await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => debug!("{} closed, reopening", device.display()),
                Err(e) if !read_failing => {
                    error!("Failed to read host reports from {}: {}", device.display(), e);
                    read_failing = true;
                }
                Err(e) => debug!("Host report read failed again: {}", e),
            }
            tokio::time::sleep(retry).await;
        }
    })
}

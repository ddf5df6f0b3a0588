//! Opens the configured transports and, once the scroller runs, starts the
//! link stack tasks that feed their status and host reports back in.
//!
//! A transport that fails to open is logged and left out; the rest still run.

use super::{Transport, WiredSettings, WirelessSettings};
use crate::runtime::ScrollerHandle;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[cfg(target_os = "linux")]
use std::path::PathBuf;
#[cfg(target_os = "linux")]
use std::time::Duration;

#[cfg(target_os = "linux")]
const GADGET_REOPEN_DELAY: Duration = Duration::from_secs(1);

enum Attachment {
    #[cfg(target_os = "linux")]
    Gadget {
        device: PathBuf,
        udc_dir: Option<PathBuf>,
        state_poll: Duration,
    },
    #[cfg(unix)]
    Socket(super::bridge_socket::BridgeSocket),
}

/// Transports in registration order, each with the link stack that drives it.
#[derive(Default)]
pub struct TransportSet {
    transports: Vec<Arc<dyn Transport>>,
    attachments: Vec<Attachment>,
}

impl TransportSet {
    /// Must be called from within a tokio runtime.
    pub async fn open(wired: &WiredSettings, wireless: &WirelessSettings) -> Self {
        let mut set = Self::default();
        set.open_wired(wired).await;
        set.open_wireless(wireless);
        if set.is_empty() {
            warn!("No transport could be opened");
        } else {
            info!("Opened {} transport(s)", set.len());
        }
        set
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }

    /// Transports to hand to [`ScrollerHandle::spawn`], in the same order.
    pub fn transports(&self) -> Vec<Arc<dyn Transport>> {
        self.transports.clone()
    }

    fn push(&mut self, transport: Arc<dyn Transport>, attachment: Attachment) {
        self.transports.push(transport);
        self.attachments.push(attachment);
    }

    /// Starts the link stack tasks. `handle` must have been spawned with
    /// [`TransportSet::transports`].
    pub fn attach(self, handle: &ScrollerHandle) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();
        for (&id, attachment) in handle.transports().iter().zip(self.attachments) {
            let Some(binding) = handle.binding(id) else {
                warn!("{} is not registered, link stack not started", id);
                continue;
            };
            match attachment {
                #[cfg(target_os = "linux")]
                Attachment::Gadget {
                    device,
                    udc_dir,
                    state_poll,
                } => {
                    use super::hid_gadget::{spawn_feature_reader, spawn_state_poller};

                    if let Some(udc_dir) = udc_dir {
                        tasks.push(spawn_state_poller(
                            udc_dir,
                            id,
                            handle.coordinator().clone(),
                            state_poll,
                        ));
                    }
                    tasks.push(spawn_feature_reader(device, binding, GADGET_REOPEN_DELAY));
                }
                #[cfg(unix)]
                Attachment::Socket(socket) => tasks.push(socket.serve(binding)),
            }
        }
        tasks
    }

    #[cfg(target_os = "linux")]
    async fn open_wired(&mut self, settings: &WiredSettings) {
        use super::hid_gadget::{resolve_udc, HidGadgetTransport};

        if !settings.enabled {
            info!("Wired transport disabled");
            return;
        }
        let udc_dir = resolve_udc(settings).await;
        let transport = match HidGadgetTransport::open(settings, udc_dir.clone()) {
            Ok(transport) => transport,
            Err(e) => {
                warn!("Wired transport unavailable: {}", e);
                return;
            }
        };
        self.push(
            Arc::new(transport),
            Attachment::Gadget {
                device: settings.device.clone(),
                udc_dir,
                state_poll: Duration::from_millis(settings.state_poll_ms.max(1)),
            },
        );
    }

    #[cfg(not(target_os = "linux"))]
    async fn open_wired(&mut self, settings: &WiredSettings) {
        if settings.enabled {
            warn!("Wired transport needs the Linux USB gadget driver");
        }
    }

    #[cfg(unix)]
    fn open_wireless(&mut self, settings: &WirelessSettings) {
        use super::bridge_socket::BridgeSocket;

        if !settings.enabled {
            info!("Wireless transport disabled");
            return;
        }
        match BridgeSocket::bind(settings) {
            Ok((transport, socket)) => self.push(Arc::new(transport), Attachment::Socket(socket)),
            Err(e) => warn!("Wireless transport unavailable: {}", e),
        }
    }

    #[cfg(not(unix))]
    fn open_wireless(&mut self, settings: &WirelessSettings) {
        if settings.enabled {
            warn!("Wireless bridge needs Unix domain sockets");
        }
    }
}

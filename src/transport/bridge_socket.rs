//! Serves a [`BridgeLink`] to an out-of-process wireless stack over a Unix
//! socket.
//!
//! One stack is attached at a time. Frames start with a tag byte:
//!
//! ```text
//! core -> stack   0x01 id lo hi          wheel report
//!                 0x02                   wakeup requested (restart advertising)
//!                 0x03 id len payload    feature report read back
//! stack -> core   0x10 code              link status code
//!                 0x11 id len payload    host wrote a feature report
//!                 0x12 id                host reads a feature report
//! ```
//!
//! When the stack goes away its link is reported disconnected.

use super::bridge::{bridge, BridgeEvent, BridgeLink, BridgeTransport};
use super::{TransportError, WheelReport, WirelessSettings};
use crate::link::{LinkBinding, TransportKind, WirelessStatus};
use std::io;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const FRAME_REPORT: u8 = 0x01;
pub const FRAME_WAKEUP: u8 = 0x02;
pub const FRAME_FEATURE: u8 = 0x03;
pub const FRAME_STATUS: u8 = 0x10;
pub const FRAME_SET_FEATURE: u8 = 0x11;
pub const FRAME_GET_FEATURE: u8 = 0x12;

/// Frames sent by the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackFrame {
    Status(u8),
    SetFeature { report_id: u8, payload: Vec<u8> },
    GetFeature(u8),
}

impl StackFrame {
    /// Reads one frame; `None` on a clean end of stream.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Self>> {
        let tag = match reader.read_u8().await {
            Ok(tag) => tag,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        };
        let frame = match tag {
            FRAME_STATUS => StackFrame::Status(reader.read_u8().await?),
            FRAME_SET_FEATURE => {
                let report_id = reader.read_u8().await?;
                let len = reader.read_u8().await? as usize;
                let mut payload = vec![0u8; len];
                reader.read_exact(&mut payload).await?;
                StackFrame::SetFeature { report_id, payload }
            }
            FRAME_GET_FEATURE => StackFrame::GetFeature(reader.read_u8().await?),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown frame tag {other:#04x}"),
                ))
            }
        };
        Ok(Some(frame))
    }
}

/// Frames sent to the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreFrame {
    Report(WheelReport),
    Wakeup,
    Feature { report_id: u8, payload: Vec<u8> },
}

impl CoreFrame {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            CoreFrame::Report(report) => {
                let mut bytes = vec![FRAME_REPORT];
                bytes.extend_from_slice(&report.to_bytes());
                bytes
            }
            CoreFrame::Wakeup => vec![FRAME_WAKEUP],
            CoreFrame::Feature { report_id, payload } => {
                let len = payload.len().min(u8::MAX as usize);
                let mut bytes = vec![FRAME_FEATURE, *report_id, len as u8];
                bytes.extend_from_slice(&payload[..len]);
                bytes
            }
        }
    }
}

impl From<BridgeEvent> for CoreFrame {
    fn from(event: BridgeEvent) -> Self {
        match event {
            BridgeEvent::Report(report) => CoreFrame::Report(report),
            BridgeEvent::WakeupRequested => CoreFrame::Wakeup,
        }
    }
}

/// A bound socket waiting for the scroller to register its transport.
pub struct BridgeSocket {
    listener: UnixListener,
    link: BridgeLink,
    path: PathBuf,
}

impl BridgeSocket {
    /// Binds the socket and creates the transport half. Must be called from
    /// within a tokio runtime.
    pub fn bind(settings: &WirelessSettings) -> Result<(BridgeTransport, Self), TransportError> {
        let path = settings.socket.clone();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                TransportError::InitializationError(format!("{}: {}", dir.display(), e))
            })?;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed stale socket {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(TransportError::InitializationError(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        }
        let listener = UnixListener::bind(&path).map_err(|e| {
            TransportError::InitializationError(format!("{}: {}", path.display(), e))
        })?;
        info!("Wireless bridge listening on {}", path.display());

        let (transport, link) = bridge(
            settings.name.clone(),
            TransportKind::Wireless,
            settings.report_buffer,
        );
        Ok((
            transport,
            Self {
                listener,
                link,
                path,
            },
        ))
    }

    /// Accepts stacks one after another for the lifetime of the task.
    pub fn serve(self, binding: LinkBinding) -> JoinHandle<()> {
        let Self {
            listener,
            mut link,
            path,
        } = self;
        link.bind(binding.clone());

        tokio::spawn(async move {
            loop {
                let stream = match listener.accept().await {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        error!("Failed to accept on {}: {}", path.display(), e);
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        continue;
                    }
                };

                let stale = link.discard_pending();
                info!("Wireless stack attached ({} stale reports dropped)", stale);
                match serve_stack(stream, &mut link, &binding).await {
                    Ok(()) => info!("Wireless stack detached"),
                    Err(e) => warn!("Wireless stack connection failed: {}", e),
                }

                if let Err(e) = link.report_status(WirelessStatus::Disconnected.code()) {
                    warn!("Could not mark wireless link disconnected: {}", e);
                }
            }
        })
    }
}

async fn serve_stack(
    stream: UnixStream,
    link: &mut BridgeLink,
    binding: &LinkBinding,
) -> io::Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let (reply_tx, mut replies) = mpsc::channel(4);
    let inbound_binding = binding.clone();
    let inbound = tokio::spawn(async move {
        loop {
            match StackFrame::read_from(&mut reader).await {
                Ok(Some(frame)) => {
                    if let Some(reply) = handle_stack_frame(&inbound_binding, frame) {
                        if reply_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Bad frame from wireless stack: {}", e);
                    break;
                }
            }
        }
    });

    let result = loop {
        let frame = tokio::select! {
            reply = replies.recv() => match reply {
                Some(reply) => reply,
                None => break Ok(()),
            },
            event = link.next_event() => match event {
                Some(event) => CoreFrame::from(event),
                None => break Ok(()),
            },
        };
        if let Err(e) = writer.write_all(&frame.encode()).await {
            break Err(e);
        }
    };
    inbound.abort();
    result
}

/// Applies one inbound frame; returns the reply owed to the stack, if any.
pub fn handle_stack_frame(binding: &LinkBinding, frame: StackFrame) -> Option<CoreFrame> {
    match frame {
        StackFrame::Status(code) => {
            // Rejected codes are logged by the coordinator.
            let _ = binding.on_status(code);
            None
        }
        StackFrame::SetFeature { report_id, payload } => {
            let _ = binding.on_feature_write(report_id, &payload);
            None
        }
        StackFrame::GetFeature(report_id) => {
            let payload = binding.read_feature(report_id).unwrap_or_default();
            Some(CoreFrame::Feature { report_id, payload })
        }
    }
}

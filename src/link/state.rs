//! Per-family link states, the status codes that drive them, and the
//! transition rules between them.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Wired,
    Wireless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WiredLinkState {
    Disconnected,
    PoweredOnly,
    Configured,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WirelessLinkState {
    Disconnected,
    Advertising,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Wired(WiredLinkState),
    Wireless(WirelessLinkState),
}

impl LinkState {
    pub fn initial(kind: TransportKind) -> Self {
        match kind {
            TransportKind::Wired => LinkState::Wired(WiredLinkState::Disconnected),
            TransportKind::Wireless => LinkState::Wireless(WirelessLinkState::Disconnected),
        }
    }

    /// Whether reports sent in this state can reach the host.
    pub fn is_deliverable(self) -> bool {
        matches!(
            self,
            LinkState::Wired(WiredLinkState::Configured)
                | LinkState::Wireless(WirelessLinkState::Connected)
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            LinkState::Wired(WiredLinkState::Disconnected) => "DISCONNECTED",
            LinkState::Wired(WiredLinkState::PoweredOnly) => "POWERED",
            LinkState::Wired(WiredLinkState::Configured) => "ACTIVE",
            LinkState::Wired(WiredLinkState::Suspended) => "SUSPENDED",
            LinkState::Wireless(WirelessLinkState::Disconnected) => "DISCONNECTED",
            LinkState::Wireless(WirelessLinkState::Advertising) => "ADVERTISING",
            LinkState::Wireless(WirelessLinkState::Connected) => "CONNECTED",
        }
    }

    fn code(self) -> u8 {
        match self {
            LinkState::Wired(WiredLinkState::Disconnected) => 0x00,
            LinkState::Wired(WiredLinkState::PoweredOnly) => 0x01,
            LinkState::Wired(WiredLinkState::Configured) => 0x02,
            LinkState::Wired(WiredLinkState::Suspended) => 0x03,
            LinkState::Wireless(WirelessLinkState::Disconnected) => 0x10,
            LinkState::Wireless(WirelessLinkState::Advertising) => 0x11,
            LinkState::Wireless(WirelessLinkState::Connected) => 0x12,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x00 => LinkState::Wired(WiredLinkState::Disconnected),
            0x01 => LinkState::Wired(WiredLinkState::PoweredOnly),
            0x02 => LinkState::Wired(WiredLinkState::Configured),
            0x03 => LinkState::Wired(WiredLinkState::Suspended),
            0x10 => LinkState::Wireless(WirelessLinkState::Disconnected),
            0x11 => LinkState::Wireless(WirelessLinkState::Advertising),
            0x12 => LinkState::Wireless(WirelessLinkState::Connected),
            _ => return None,
        })
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lock-free snapshot of one transport's [`LinkState`]. Only the coordinator stores.
#[derive(Debug)]
pub struct LinkStateCell(AtomicU8);

impl LinkStateCell {
    pub fn new(state: LinkState) -> Self {
        Self(AtomicU8::new(state.code()))
    }

    pub fn load(&self) -> LinkState {
        // Only codes written by `store` ever land in the cell.
        LinkState::from_code(self.0.load(Ordering::Acquire))
            .unwrap_or(LinkState::Wired(WiredLinkState::Disconnected))
    }

    pub(crate) fn store(&self, state: LinkState) {
        self.0.store(state.code(), Ordering::Release);
    }

    pub fn is_deliverable(&self) -> bool {
        self.load().is_deliverable()
    }
}

/// USB device-controller status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WiredStatus {
    Error = 0,
    Reset = 1,
    Connected = 2,
    Configured = 3,
    Disconnected = 4,
    Suspend = 5,
    Resume = 6,
    Interface = 7,
    SetHalt = 8,
    ClearHalt = 9,
    Sof = 10,
    Unknown = 11,
}

impl WiredStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => WiredStatus::Error,
            1 => WiredStatus::Reset,
            2 => WiredStatus::Connected,
            3 => WiredStatus::Configured,
            4 => WiredStatus::Disconnected,
            5 => WiredStatus::Suspend,
            6 => WiredStatus::Resume,
            7 => WiredStatus::Interface,
            8 => WiredStatus::SetHalt,
            9 => WiredStatus::ClearHalt,
            10 => WiredStatus::Sof,
            11 => WiredStatus::Unknown,
            _ => return None,
        })
    }
}

/// Connection events reported by a wireless stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WirelessStatus {
    Ready = 0,
    AdvertisingStarted = 1,
    Connected = 2,
    Disconnected = 3,
    AdvertisingStopped = 4,
}

impl WirelessStatus {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => WirelessStatus::Ready,
            1 => WirelessStatus::AdvertisingStarted,
            2 => WirelessStatus::Connected,
            3 => WirelessStatus::Disconnected,
            4 => WirelessStatus::AdvertisingStopped,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Wired(WiredStatus),
    Wireless(WirelessStatus),
}

impl LinkStatus {
    /// Decodes a raw status code for the given transport family.
    pub fn decode(kind: TransportKind, code: u8) -> Option<Self> {
        match kind {
            TransportKind::Wired => WiredStatus::from_code(code).map(LinkStatus::Wired),
            TransportKind::Wireless => WirelessStatus::from_code(code).map(LinkStatus::Wireless),
        }
    }

    pub fn is_reset(self) -> bool {
        matches!(self, LinkStatus::Wired(WiredStatus::Reset))
    }
}

/// Result of feeding one status into a [`LinkMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed { from: LinkState, to: LinkState },
    Unchanged(LinkState),
    /// Status carries no state information for this link (SOF, halt, ...).
    NotApplicable,
}

/// Per-transport state machine, including the state to return to after a
/// host-initiated suspend.
#[derive(Debug, Clone)]
pub struct LinkMachine {
    state: LinkState,
    before_suspend: WiredLinkState,
}

impl LinkMachine {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            state: LinkState::initial(kind),
            before_suspend: WiredLinkState::Disconnected,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn apply(&mut self, status: LinkStatus) -> Transition {
        let next = match (self.state, status) {
            (LinkState::Wired(current), LinkStatus::Wired(status)) => {
                self.next_wired(current, status).map(LinkState::Wired)
            }
            (LinkState::Wireless(_), LinkStatus::Wireless(status)) => {
                Some(LinkState::Wireless(next_wireless(status)))
            }
            _ => None,
        };

        match next {
            None => Transition::NotApplicable,
            Some(next) if next == self.state => Transition::Unchanged(next),
            Some(next) => {
                let from = self.state;
                self.state = next;
                Transition::Changed { from, to: next }
            }
        }
    }

    fn next_wired(&mut self, current: WiredLinkState, status: WiredStatus) -> Option<WiredLinkState> {
        match status {
            WiredStatus::Unknown | WiredStatus::Disconnected => Some(WiredLinkState::Disconnected),
            WiredStatus::Connected | WiredStatus::Reset => Some(WiredLinkState::PoweredOnly),
            WiredStatus::Configured => Some(WiredLinkState::Configured),
            WiredStatus::Suspend => {
                if current != WiredLinkState::Suspended {
                    self.before_suspend = current;
                }
                Some(WiredLinkState::Suspended)
            }
            WiredStatus::Resume => {
                if current == WiredLinkState::Suspended {
                    Some(self.before_suspend)
                } else {
                    Some(current)
                }
            }
            WiredStatus::Error
            | WiredStatus::Interface
            | WiredStatus::SetHalt
            | WiredStatus::ClearHalt
            | WiredStatus::Sof => None,
        }
    }
}

fn next_wireless(status: WirelessStatus) -> WirelessLinkState {
    match status {
        WirelessStatus::Ready | WirelessStatus::Disconnected | WirelessStatus::AdvertisingStopped => {
            WirelessLinkState::Disconnected
        }
        WirelessStatus::AdvertisingStarted => WirelessLinkState::Advertising,
        WirelessStatus::Connected => WirelessLinkState::Connected,
    }
}

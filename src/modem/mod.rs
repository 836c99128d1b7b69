//! Session types shared across the modem engine.

pub mod dialect;
pub mod engine;
mod line;
mod parse;

pub(crate) const LINE_MAX_LENGTH: usize = 64;
pub(crate) const IDSTRING_MAX_LENGTH: usize = 32;
pub(crate) const APN_MAX_LENGTH: usize = 64;
pub(crate) const HOST_MAX_LENGTH: usize = 64;
pub(crate) const IP_MAX_LENGTH: usize = 16;
pub(crate) const CMD_MAX_LENGTH: usize = 96;

/// TX-ring bytes reserved for the `AT+CIPSEND` envelope around a burst.
pub(crate) const SEND_COMMAND_RESERVE: u16 = 22;
/// RX-ring slack kept for the `+CIPRXGET: 2,0,<n>` header and trailer.
pub(crate) const RX_HEADER_RESERVE: u16 = 8;

pub(crate) const RSSI_UNKNOWN: u8 = 99;
pub(crate) const RSSI_PENDING: u8 = u8::MAX;

// State flags. A single word so ISR-context readers see one coherent
// snapshot.
pub(crate) const LINE_READ: u8 = 1 << 0;
pub(crate) const IP_CONNECTED: u8 = 1 << 1;
pub(crate) const DATA_PENDING: u8 = 1 << 2;
pub(crate) const DISCONNECT_PENDING: u8 = 1 << 3;
pub(crate) const CONNECT_PENDING: u8 = 1 << 4;
pub(crate) const RESET_PENDING: u8 = 1 << 5;
pub(crate) const SERIAL_LOCKED: u8 = 1 << 6;

/// Where the session currently stands. Error phases latch until the
/// application calls `disconnect()` and `connect()` again.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionPhase {
    NotConnected,
    Connecting,
    /// Teardown in progress; the socket is gone but the session has not
    /// settled back to idle yet.
    Intermediate,
    Connected,
    DnsError,
    GeneralError,
    ConnectionError,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdKind {
    Manufacturer,
    Model,
    Imei,
    Imsi,
}

/// Engine tuning knobs; the defaults match a 10-100 ms tick period.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Bounded retries for a command answered with `ERROR` before the
    /// session escalates to `GeneralError`.
    pub retry_limit: u8,
    /// `CREG?`/`CGATT?` polls tolerated before the attach probe gives
    /// up. Separate from `retry_limit`: a "not yet registered" reply is
    /// normal while the network is still searching.
    pub registration_retries: u16,
    /// Ticks an in-flight reply may stay unmatched before timeout
    /// escalation.
    pub reply_timeout_ticks: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry_limit: 3,
            registration_retries: 60,
            reply_timeout_ticks: 2000,
        }
    }
}

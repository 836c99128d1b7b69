#![cfg_attr(not(test), no_std)]

pub mod modem;
pub mod platform;
pub mod ring;

pub use modem::dialect::{ModemDialect, SIM800, SIM7X00};
pub use modem::engine::GsmEngine;
pub use modem::{Config, ConnectionPhase, IdKind};
pub use platform::SerialOps;
pub use ring::CircularBuffer;

//! Transport seam between the session engine and the host's UART driver.

/// Byte-buffered, non-blocking serial transport.
///
/// Implementations front a UART with SPSC receive/transmit rings; every
/// call returns immediately. The engine relies on the fill-level queries
/// to size command bursts and receive windows, so they must reflect the
/// ring state, not the wire state.
pub trait SerialOps {
    /// Number of received bytes waiting to be read.
    fn bytes_available(&self) -> u16;

    /// Free space in the transmit ring.
    fn space_available(&self) -> u16;

    /// Total capacity of the receive ring.
    fn read_buffer_size(&self) -> u16;

    /// Reads a single byte. Callers guard with `bytes_available()`.
    fn read_byte(&mut self) -> u8;

    /// Reads up to `buffer.len()` bytes, returning the number copied.
    fn read(&mut self, buffer: &mut [u8]) -> u16;

    /// Queues bytes for transmission, returning the number accepted.
    fn write(&mut self, data: &[u8]) -> u16;

    /// Discards everything in the receive ring.
    fn flush_receive_buffers(&mut self);
}

use crate::modem::LINE_MAX_LENGTH;
use crate::platform::SerialOps;

/// Accumulates UART bytes into one bounded reply line.
///
/// A line completes on `\n`, on `>` (the CIPSEND data prompt, which is
/// never followed by a line end), or when the buffer fills up.
pub(crate) struct LineBuffer {
    buffer: [u8; LINE_MAX_LENGTH],
    fill: usize,
    len: usize,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self {
            buffer: [0; LINE_MAX_LENGTH],
            fill: 0,
            len: 0,
        }
    }

    /// Drains available serial bytes; returns true exactly when a
    /// terminator was seen and `line()` holds a completed line.
    pub(crate) fn fill_from<S: SerialOps>(&mut self, serial: &mut S) -> bool {
        while serial.bytes_available() > 0 {
            let byte = serial.read_byte();
            self.buffer[self.fill] = byte;
            self.fill += 1;
            if byte == b'\n' || byte == b'>' || self.fill == LINE_MAX_LENGTH {
                self.len = self.fill;
                self.fill = 0;
                return true;
            }
        }
        false
    }

    pub(crate) fn line(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    pub(crate) fn reset(&mut self) {
        self.fill = 0;
        self.len = 0;
    }
}

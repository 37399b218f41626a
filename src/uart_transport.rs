//! The byte stream and control line interface a uart driver has to provide.
//!
//! Any driver that behaves like a 250000 baud 8N2 uart with break support can back a
//! [crate::dmx_port::DmxPort], whether it is interrupt driven or polled.

/// Line error bits reported with [UartEvent::LineError].
pub mod line_error {
    pub const OVERRUN: u8 = 0x02;
    pub const PARITY: u8 = 0x04;
    pub const FRAMING: u8 = 0x08;
}

/// Something the uart observed. Produced in interrupt context, consumed by the port.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartEvent {
    /// The line was held low for longer than a character.
    BreakDetected,
    /// At least this many bytes can be read.
    DataAvailable(usize),
    /// Overrun, parity or framing error; see [line_error].
    LineError(u8),
    /// The transmit fifo can take more bytes.
    TxSpaceAvailable,
    /// The last written byte has left the shift register.
    TxComplete,
}

/// Access to the uart.
pub trait UartTransport {
    /// Writes as many bytes as fit without blocking.
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, buffer: &[u8]) -> usize;

    /// Reads already received bytes without blocking.
    /// Returns the number of bytes actually read.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> usize;

    /// Holds the line low while `on`.
    fn set_break(&mut self, on: bool);

    /// Drives the output lines selected by `mask` to `values`, e.g. the RS485 direction enable.
    fn set_output_lines(&mut self, mask: u32, values: u32);
}

impl<T: UartTransport + ?Sized> UartTransport for &mut T {
    fn write_bytes(&mut self, buffer: &[u8]) -> usize {
        (**self).write_bytes(buffer)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> usize {
        (**self).read_bytes(buffer)
    }

    fn set_break(&mut self, on: bool) {
        (**self).set_break(on)
    }

    fn set_output_lines(&mut self, mask: u32, values: u32) {
        (**self).set_output_lines(mask, values)
    }
}

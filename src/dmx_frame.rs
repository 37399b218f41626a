use modular_bitfield::bitfield;
use modular_bitfield::prelude::B4;

use crate::consts::{
    BREAKSIZE_UNIT_MICROS, DEFAULT_BREAKSIZE, DMX_MAX_PACKAGE_SIZE, DMX_MAX_SLOTS,
    DMX_NULL_START, MIN_BREAK_MICROS, SC_RDM,
};

pub type DmxPayload = heapless::Vec<u8, DMX_MAX_SLOTS>;
/// Start code followed by the payload, as it goes over the wire.
pub type WireFrame = heapless::Vec<u8, DMX_MAX_PACKAGE_SIZE>;

#[bitfield]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameFlags {
    /// The frame carries an RDM package.
    pub is_rdm: bool,
    /// The frame is a DISC_UNIQUE_BRANCH request or reply.
    pub is_rdm_discovery: bool,
    /// Transmit without a leading break (discovery replies).
    pub no_break: bool,
    /// The frame was handed to the port for transmission.
    pub is_transmit: bool,
    #[skip]
    reserved: B4,
}

impl Default for FrameFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// One DMX512 frame: the start code and up to 512 slots.
///
/// Whoever holds the value owns the buffer; the port passes it on when a reception completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dmx512Frame {
    pub port: u8,
    pub startcode: u8,
    /// Break length in units of 4µs.
    pub breaksize: u8,
    pub flags: FrameFlags,
    pub payload: DmxPayload,
}

impl Default for Dmx512Frame {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Dmx512Frame {
    pub fn new(port: u8) -> Self {
        Self {
            port,
            startcode: DMX_NULL_START,
            breaksize: DEFAULT_BREAKSIZE,
            flags: FrameFlags::new(),
            payload: DmxPayload::new(),
        }
    }

    /// A null start code frame. Slots beyond 512 are cut off.
    pub fn dmx(port: u8, slots: &[u8]) -> Self {
        Self::with_startcode(port, DMX_NULL_START, slots)
    }

    pub fn with_startcode(port: u8, startcode: u8, slots: &[u8]) -> Self {
        let mut frame = Self::new(port);
        frame.startcode = startcode;
        frame.set_payload(slots);
        frame.flags.set_is_rdm(startcode == SC_RDM);

        frame
    }

    /// Wraps a serialized RDM package (start code included).
    pub fn rdm(port: u8, package: &[u8]) -> Self {
        match package.split_first() {
            Some((startcode, payload)) => {
                let mut frame = Self::with_startcode(port, *startcode, payload);
                frame.flags.set_is_rdm(true);
                frame
            },
            None => Self::new(port),
        }
    }

    /// Wraps a DISC_UNIQUE_BRANCH reply, which is sent without a break.
    pub fn discovery_reply(port: u8, reply: &[u8]) -> Self {
        let mut frame = Self::rdm(port, reply);
        frame.flags.set_is_rdm_discovery(true);
        frame.flags.set_no_break(true);

        frame
    }

    pub fn set_payload(&mut self, slots: &[u8]) {
        self.payload.clear();
        let slot_count = slots.len().min(DMX_MAX_SLOTS);
        // bounded by the capacity above
        let _ = self.payload.extend_from_slice(&slots[..slot_count]);
    }

    pub fn payload_size(&self) -> u16 {
        self.payload.len() as u16
    }

    /// Bytes on the wire: start code plus payload.
    pub fn wire_len(&self) -> usize {
        self.payload.len() + 1
    }

    pub fn wire_byte(&self, index: usize) -> Option<u8> {
        match index {
            0 => Some(self.startcode),
            index => self.payload.get(index - 1).copied(),
        }
    }

    pub fn to_wire(&self) -> WireFrame {
        let mut wire = WireFrame::new();
        let _ = wire.push(self.startcode);
        let _ = wire.extend_from_slice(&self.payload);

        wire
    }

    /// How long the transmitter holds the break, never shorter than 176µs.
    pub fn break_micros(&self) -> u32 {
        (self.breaksize as u32 * BREAKSIZE_UNIT_MICROS).max(MIN_BREAK_MICROS)
    }

    /// Resets the frame for reuse by a pool.
    pub fn clear(&mut self) {
        self.startcode = DMX_NULL_START;
        self.breaksize = DEFAULT_BREAKSIZE;
        self.flags = FrameFlags::new();
        self.payload.clear();
    }
}

/// Fixed set of frame buffers shared by reception and transmission.
pub struct FramePool<const N: usize> {
    free: heapless::Vec<Dmx512Frame, N>,
}

impl<const N: usize> Default for FramePool<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FramePool<N> {
    pub fn new() -> Self {
        let mut free = heapless::Vec::new();
        while free.push(Dmx512Frame::default()).is_ok() {}

        Self { free }
    }

    /// Takes a cleared buffer from the pool. `None` if every buffer is in use.
    pub fn acquire(&mut self, port: u8) -> Option<Dmx512Frame> {
        let mut frame = self.free.pop()?;
        frame.clear();
        frame.port = port;

        Some(frame)
    }

    /// Hands a buffer back. Buffers beyond the pool size are dropped.
    pub fn release(&mut self, frame: Dmx512Frame) {
        if self.free.push(frame).is_err() {
            log::trace!("frame pool full, dropping returned frame");
        }
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

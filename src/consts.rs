pub const DMX_NULL_START: u8 = 0x00;
/// Slots after the start code.
pub const DMX_MAX_SLOTS: usize = 512;
/// start code + 512 byte package
pub const DMX_MAX_PACKAGE_SIZE: usize = DMX_MAX_SLOTS + 1;
pub const SC_RDM: u8 = 0xCC;
pub const SC_SUB_MESSAGE: u8 = 0x01;

pub const PREAMBLE_BYTE: u8 = 0xFE;
pub const SEPARATOR_BYTE: u8 = 0xAA;
pub const MAX_PREAMBLE_LENGTH: usize = 7;

pub const BROADCAST_UID: u64 = 0xFFFF_FFFFFFFF;
pub const UID_MASK: u64 = 0xFFFF_FFFFFFFF;

/// One 8N2 slot (start bit, 8 data bits, 2 stop bits) at 250000 baud.
pub const SLOT_MICROS: u32 = 44;

/// Shortest break the transmitter ever asserts.
pub const MIN_BREAK_MICROS: u32 = 176;
/// `Dmx512Frame::breaksize` is counted in units of this many microseconds.
pub const BREAKSIZE_UNIT_MICROS: u32 = 4;
pub const DEFAULT_BREAKSIZE: u8 = 50;

/// Default wait for a DISC_UNIQUE_BRANCH reply window.
pub const DISCOVERY_REPLY_TIMEOUT_MICROS: u32 = 5_800;
/// Default wait for the break of a standard RDM reply.
pub const RDM_REPLY_TIMEOUT_MICROS: u32 = 2_800;

/// Consecutive equally sized null start code frames needed to lock the slot count.
pub const SLOT_COUNT_REQUIRED_MATCHES: u8 = 10;

/// Header bytes covered by the message length, start code included.
pub const RDM_HEADER_SIZE: usize = 24;
/// Offset of the parameter data length byte on the wire (start code is byte 0).
pub const RDM_PDL_OFFSET: usize = 23;
pub const RDM_CHECKSUM_SIZE: usize = 2;
pub const RDM_MIN_PACKAGE_SIZE: usize = RDM_HEADER_SIZE + RDM_CHECKSUM_SIZE;
pub const RDM_MAX_PACKAGE_SIZE: usize = 257;
/// Excluding preamble and separator
pub const RDM_DISCOVERY_RESPONSE_SIZE: usize = 16;
/// Including 7 bytes preamble + 1 byte separator
pub const RDM_MAX_DISCOVERY_RESPONSE_SIZE: usize = RDM_DISCOVERY_RESPONSE_SIZE + 8;

pub const RDM_MAX_PARAMETER_DATA_LENGTH: usize = 231;

/// Output line mask that switches the RS485 transceiver to transmit.
pub const LINE_TX_ENABLE: u32 = 0x01;

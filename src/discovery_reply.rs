//! Wire format of DISC_UNIQUE_BRANCH replies.
//!
//! A reply is sent without a break: up to seven `0xFE` preamble bytes, the `0xAA` separator,
//! then the uid and a checksum where every byte `b` is sent twice as `b | 0xAA`, `b | 0x55`.
//! When several responders answer at once the bytes overlap on the bus, which shows up as a
//! framing error, an overlong preamble or a checksum mismatch.

use crate::consts::{
    MAX_PREAMBLE_LENGTH, PREAMBLE_BYTE, RDM_DISCOVERY_RESPONSE_SIZE,
    RDM_MAX_DISCOVERY_RESPONSE_SIZE, SEPARATOR_BYTE,
};
use crate::rdm_codec::calculate_checksum;
use crate::unique_identifier::Uid;

/// Size of the collected reply buffer. Leaves room for trailing garbage of a collision.
pub const DISCOVERY_REPLY_BUFFER_SIZE: usize = 32;

/// Interpretation of the bytes received after a DISC_UNIQUE_BRANCH request.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryReply {
    /// No device responded to the discovery request.
    NoReply,
    /// The response couldn't be decoded. There are multiple devices in the range.
    Collision,
    /// Exactly one device answered.
    Unique(Uid),
}

impl DiscoveryReply {
    /// The uid a reply resolves to: [Uid::any] for silence, [Uid::broadcast] for a collision.
    pub fn source(&self) -> Uid {
        match self {
            DiscoveryReply::NoReply => Uid::any(),
            DiscoveryReply::Collision => Uid::broadcast(),
            DiscoveryReply::Unique(uid) => *uid,
        }
    }
}

/// Builds the 24 byte reply a responder sends when its uid lies in the requested range.
pub fn encode_discovery_response(uid: Uid) -> [u8; RDM_MAX_DISCOVERY_RESPONSE_SIZE] {
    let mut frame_buffer = [PREAMBLE_BYTE; RDM_MAX_DISCOVERY_RESPONSE_SIZE];
    frame_buffer[MAX_PREAMBLE_LENGTH] = SEPARATOR_BYTE;

    encode_disc_unique(&uid.to_bytes(), &mut frame_buffer[8..20]);

    let checksum = calculate_checksum(&frame_buffer[8..20]);
    encode_disc_unique(&checksum.to_be_bytes(), &mut frame_buffer[20..24]);

    frame_buffer
}

/// Encodes every source byte into two bytes. `dest` has to be twice the size of `src`.
fn encode_disc_unique(src: &[u8], dest: &mut [u8]) {
    for (index, byte) in src.iter().enumerate() {
        dest[index * 2] = byte | 0xAA;
        dest[index * 2 + 1] = byte | 0x55;
    }
}

/// Decode a discovery package. The destination has to be at least half the source size.
fn decode_disc_unique(src: &[u8], dest: &mut [u8]) {
    for (index, byte) in src.chunks(2).map(|chunk| chunk[0] & chunk[1]).enumerate() {
        dest[index] = byte;
    }
}

/// Decodes a complete or partial reply.
///
/// Only silence is [DiscoveryReply::NoReply]. Bytes without a separator are overlapping replies.
pub fn decode_discovery_response(buffer: &[u8]) -> DiscoveryReply {
    if buffer.is_empty() {
        return DiscoveryReply::NoReply;
    }

    let Some(index_of_separator_byte) = buffer.iter().position(|&x| x == SEPARATOR_BYTE) else {
        return DiscoveryReply::Collision;
    };

    // Only preamble bytes may precede the separator, at most seven of them.
    if index_of_separator_byte > MAX_PREAMBLE_LENGTH
        || buffer[..index_of_separator_byte]
            .iter()
            .any(|&byte| byte != PREAMBLE_BYTE)
    {
        return DiscoveryReply::Collision;
    }

    let start_index = index_of_separator_byte + 1;
    if buffer.len() - start_index < RDM_DISCOVERY_RESPONSE_SIZE {
        return DiscoveryReply::Collision;
    }

    let encoded = &buffer[start_index..start_index + RDM_DISCOVERY_RESPONSE_SIZE];

    let mut uid_buffer = [0u8; 6];
    decode_disc_unique(&encoded[..12], &mut uid_buffer);
    let mut checksum_buffer = [0u8; 2];
    decode_disc_unique(&encoded[12..], &mut checksum_buffer);

    if calculate_checksum(&encoded[..12]) != u16::from_be_bytes(checksum_buffer) {
        return DiscoveryReply::Collision;
    }

    let uid = Uid::from_bytes(&uid_buffer);
    if uid.is_broadcast() {
        return DiscoveryReply::Collision;
    }

    DiscoveryReply::Unique(uid)
}

/// Raw bytes received while a DISC_UNIQUE_BRANCH reply window is open.
#[derive(Debug, Default, Clone)]
pub struct DiscoveryReplyBuffer {
    bytes: heapless::Vec<u8, DISCOVERY_REPLY_BUFFER_SIZE>,
    overflowed: bool,
}

impl DiscoveryReplyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.overflowed = false;
    }

    pub fn push(&mut self, byte: u8) {
        if self.bytes.push(byte).is_err() {
            self.overflowed = true;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// True once the separator and all encoded bytes after it have arrived.
    pub fn is_complete(&self) -> bool {
        self.bytes
            .iter()
            .position(|&byte| byte == SEPARATOR_BYTE)
            .is_some_and(|index| self.bytes.len() - index - 1 >= RDM_DISCOVERY_RESPONSE_SIZE)
    }

    pub fn decode(&self) -> DiscoveryReply {
        // More bytes than a single reply can hold means overlapping responders.
        if self.overflowed {
            return DiscoveryReply::Collision;
        }

        decode_discovery_response(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let reply = encode_discovery_response(Uid::new(0x7FF0, 0x0000_0005));

        assert_eq!(&reply[..7], &[PREAMBLE_BYTE; 7]);
        assert_eq!(reply[7], SEPARATOR_BYTE);
        // 0x7F encodes as 0xFF, 0x7F
        assert_eq!(&reply[8..10], &[0xFF, 0x7F]);
        // 0xF0 encodes as 0xFA, 0xF5
        assert_eq!(&reply[10..12], &[0xFA, 0xF5]);
    }

    #[test]
    fn test_decode_full_and_short_preamble() {
        let uid = Uid::new(0x1234, 0x5678_9ABC);
        let reply = encode_discovery_response(uid);

        assert_eq!(decode_discovery_response(&reply), DiscoveryReply::Unique(uid));
        // responders may drop preamble bytes
        assert_eq!(decode_discovery_response(&reply[7..]), DiscoveryReply::Unique(uid));
        assert_eq!(decode_discovery_response(&reply[3..]), DiscoveryReply::Unique(uid));
    }

    #[test]
    fn test_decode_failures() {
        assert_eq!(decode_discovery_response(&[]), DiscoveryReply::NoReply);
        assert_eq!(
            decode_discovery_response(&[0xFE, 0xFE, 0x12]),
            DiscoveryReply::Collision
        );

        let mut reply = encode_discovery_response(Uid::new(0x1234, 1));
        reply[12] &= 0xFD;
        assert_eq!(decode_discovery_response(&reply), DiscoveryReply::Collision);

        let reply = encode_discovery_response(Uid::new(0x1234, 1));
        assert_eq!(
            decode_discovery_response(&reply[..20]),
            DiscoveryReply::Collision
        );

        let mut long_preamble = [PREAMBLE_BYTE; 32];
        long_preamble[8..].copy_from_slice(&encode_discovery_response(Uid::new(0x1234, 1)));
        assert_eq!(
            decode_discovery_response(&long_preamble),
            DiscoveryReply::Collision
        );
    }

    #[test]
    fn test_overlapping_replies_without_separator() {
        let seven = encode_discovery_response(Uid::new(0x1234, 1));
        let six = encode_discovery_response(Uid::new(0x7FF0, 5));

        // one responder sends a single preamble byte less, both start together
        let mut merged = seven;
        for (byte, other_byte) in merged.iter_mut().zip(six[1..].iter()) {
            *byte |= *other_byte;
        }
        assert!(!merged.contains(&SEPARATOR_BYTE));
        assert_eq!(decode_discovery_response(&merged), DiscoveryReply::Collision);

        let mut buffer = DiscoveryReplyBuffer::new();
        for byte in merged {
            buffer.push(byte);
        }
        assert!(!buffer.is_complete());
        assert_eq!(buffer.decode(), DiscoveryReply::Collision);
    }

    #[test]
    fn test_source_mapping() {
        assert_eq!(DiscoveryReply::NoReply.source(), Uid::any());
        assert_eq!(DiscoveryReply::Collision.source(), Uid::broadcast());
        assert_eq!(
            DiscoveryReply::Unique(Uid::from_u64(5)).source(),
            Uid::from_u64(5)
        );
    }

    #[test]
    fn test_buffer_completion() {
        let reply = encode_discovery_response(Uid::new(0x0001, 2));
        let mut buffer = DiscoveryReplyBuffer::new();

        for (index, byte) in reply.iter().enumerate() {
            assert!(!buffer.is_complete(), "complete after {index} bytes");
            buffer.push(*byte);
        }

        assert!(buffer.is_complete());
        assert_eq!(buffer.decode(), DiscoveryReply::Unique(Uid::new(0x0001, 2)));

        for _ in 0..16 {
            buffer.push(0x00);
        }
        assert_eq!(buffer.decode(), DiscoveryReply::Collision);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.decode(), DiscoveryReply::NoReply);
    }
}

//! Byte level RDM packet codec.
//!
//! [RdmPacketBuilder] writes the 24 byte header, appends parameter data field by field and
//! finishes the package with the message length and the 16 bit checksum.
//! [RdmPacketView] validates a received package and gives typed access to its fields.

use crate::consts::{
    RDM_CHECKSUM_SIZE, RDM_HEADER_SIZE, RDM_MAX_PACKAGE_SIZE, RDM_MAX_PARAMETER_DATA_LENGTH,
    RDM_MIN_PACKAGE_SIZE, RDM_PDL_OFFSET, SC_RDM, SC_SUB_MESSAGE,
};
use crate::layouts::rdm_header_layout;
use crate::unique_identifier::Uid;

/// Binary representation of an RDM package.
pub type BinaryRdmPackage = heapless::Vec<u8, RDM_MAX_PACKAGE_SIZE>;

/// Sum of all bytes, truncated to 16 bits.
#[inline]
pub fn calculate_checksum(data: &[u8]) -> u16 {
    let mut checksum = 0u16;

    for byte in data {
        checksum = checksum.wrapping_add(*byte as u16);
    }

    checksum
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RdmDeserializationError {
    /// Buffer must be at least 26 bytes
    #[error("buffer too small")]
    BufferTooSmall,
    /// Buffer must be at most 257 bytes
    #[error("buffer too big")]
    BufferTooBig,
    /// The command class was not found; contains contents of command class field
    #[error("command class {0} not found")]
    CommandClassNotFound(u8),
    /// The response type was not found; contains contents of response type field
    #[error("response type {0} is unknown")]
    ResponseTypeNotFound(u8),
    /// The message length field is incorrect; contains result of parsing
    #[error("message length {0} is incorrect")]
    WrongMessageLength(usize),
    /// Wrong checksum
    #[error("checksum is incorrect")]
    WrongChecksum,
    /// Received wrong start code (0xCC) or sub start code (0x01)
    #[error("start code is incorrect")]
    WrongStartCode,
    /// The source uid is a broadcast address.
    #[error("source uid is a broadcast")]
    SourceUidIsBroadcast,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// A parameter data read past the parameter data length.
    #[error("{size} bytes at offset {offset} exceed the parameter data length {parameter_data_length}")]
    OutOfRange {
        offset: usize,
        size: usize,
        parameter_data_length: usize,
    },
    /// The parameter data would exceed 231 bytes.
    #[error("parameter data is full")]
    ParameterDataFull,
    /// Fields are at most 8 bytes wide.
    #[error("field of {0} bytes is too wide")]
    FieldTooWide(usize),
}

/// A value that can be stored in the parameter data in network byte order.
pub trait ParameterField: Sized {
    const SIZE: usize;

    /// `bytes` is exactly [Self::SIZE] long.
    fn read_be(bytes: &[u8]) -> Self;
    /// `out` is exactly [Self::SIZE] long.
    fn write_be(&self, out: &mut [u8]);
}

macro_rules! impl_parameter_field {
    ($($int:ty),*) => {
        $(
            impl ParameterField for $int {
                const SIZE: usize = core::mem::size_of::<$int>();

                fn read_be(bytes: &[u8]) -> Self {
                    let mut buffer = [0u8; core::mem::size_of::<$int>()];
                    buffer.copy_from_slice(bytes);
                    <$int>::from_be_bytes(buffer)
                }

                fn write_be(&self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_be_bytes());
                }
            }
        )*
    };
}

impl_parameter_field!(u8, u16, u32);

impl ParameterField for Uid {
    const SIZE: usize = 6;

    fn read_be(bytes: &[u8]) -> Self {
        let mut buffer = [0u8; 6];
        buffer.copy_from_slice(bytes);
        Uid::from_bytes(&buffer)
    }

    fn write_be(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.to_bytes());
    }
}

/// The fixed header fields of an RDM package.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RdmHeader {
    pub destination: Uid,
    pub source: Uid,
    pub transaction_number: u8,
    /// Port id for requests, response type for responses.
    pub port_id_response_type: u8,
    pub message_count: u8,
    pub sub_device: u16,
    pub command_class: u8,
    pub parameter_id: u16,
}

pub struct RdmPacketBuilder {
    buffer: [u8; RDM_MAX_PACKAGE_SIZE],
    parameter_data_length: usize,
}

impl RdmPacketBuilder {
    pub fn new(header: &RdmHeader) -> Self {
        let mut buffer = [0u8; RDM_MAX_PACKAGE_SIZE];
        {
            let mut memory_view = rdm_header_layout::View::new(&mut buffer[..]);

            memory_view.start_code_mut().write(SC_RDM);
            memory_view.sub_start_code_mut().write(SC_SUB_MESSAGE);
            memory_view
                .destination_uid_mut()
                .copy_from_slice(&header.destination.to_bytes());
            memory_view
                .source_uid_mut()
                .copy_from_slice(&header.source.to_bytes());
            memory_view
                .transaction_number_mut()
                .write(header.transaction_number);
            memory_view
                .port_id_response_type_mut()
                .write(header.port_id_response_type);
            memory_view.message_count_mut().write(header.message_count);
            memory_view.sub_device_mut().write(header.sub_device);
            memory_view.command_class_mut().write(header.command_class);
            memory_view.parameter_id_mut().write(header.parameter_id);
        }

        Self {
            buffer,
            parameter_data_length: 0,
        }
    }

    /// Appends the lower `size` bytes of `value` in network byte order.
    pub fn add_field(&mut self, value: u64, size: usize) -> Result<&mut Self, CodecError> {
        if size > 8 {
            return Err(CodecError::FieldTooWide(size));
        }

        self.add_bytes(&value.to_be_bytes()[8 - size..])
    }

    pub fn add<T: ParameterField>(&mut self, value: &T) -> Result<&mut Self, CodecError> {
        let start = self.reserve(T::SIZE)?;
        value.write_be(&mut self.buffer[start..start + T::SIZE]);

        Ok(self)
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) -> Result<&mut Self, CodecError> {
        let start = self.reserve(bytes.len())?;
        self.buffer[start..start + bytes.len()].copy_from_slice(bytes);

        Ok(self)
    }

    pub fn parameter_data_length(&self) -> u8 {
        self.parameter_data_length as u8
    }

    /// Writes message length and parameter data length and appends the checksum.
    pub fn finalize(mut self) -> BinaryRdmPackage {
        let message_length = RDM_HEADER_SIZE + self.parameter_data_length;

        self.buffer[2] = message_length as u8;
        self.buffer[RDM_PDL_OFFSET] = self.parameter_data_length as u8;

        let checksum = calculate_checksum(&self.buffer[..message_length]);
        self.buffer[message_length..message_length + RDM_CHECKSUM_SIZE]
            .copy_from_slice(&checksum.to_be_bytes());

        let mut package = BinaryRdmPackage::new();
        // message_length + 2 <= 257 by construction
        let _ = package.extend_from_slice(&self.buffer[..message_length + RDM_CHECKSUM_SIZE]);
        package
    }

    fn reserve(&mut self, size: usize) -> Result<usize, CodecError> {
        if self.parameter_data_length + size > RDM_MAX_PARAMETER_DATA_LENGTH {
            return Err(CodecError::ParameterDataFull);
        }

        let start = RDM_HEADER_SIZE + self.parameter_data_length;
        self.parameter_data_length += size;

        Ok(start)
    }
}

/// A validated view onto a received RDM package, start code included.
#[derive(Debug, Clone, Copy)]
pub struct RdmPacketView<'a> {
    bytes: &'a [u8],
}

impl<'a> RdmPacketView<'a> {
    /// Checks start codes, message length, parameter data length and checksum.
    pub fn decode(buffer: &'a [u8]) -> Result<Self, RdmDeserializationError> {
        let buffer_size = buffer.len();

        if buffer_size < RDM_MIN_PACKAGE_SIZE {
            return Err(RdmDeserializationError::BufferTooSmall);
        }

        if buffer_size > RDM_MAX_PACKAGE_SIZE {
            return Err(RdmDeserializationError::BufferTooBig);
        }

        let view = rdm_header_layout::View::new(buffer);

        if view.start_code().read() != SC_RDM || view.sub_start_code().read() != SC_SUB_MESSAGE {
            return Err(RdmDeserializationError::WrongStartCode);
        }

        let message_length = view.message_length().read() as usize;
        let parameter_data_length = view.parameter_data_length().read() as usize;
        if message_length != buffer_size - RDM_CHECKSUM_SIZE
            || message_length != RDM_HEADER_SIZE + parameter_data_length
        {
            return Err(RdmDeserializationError::WrongMessageLength(message_length));
        }

        let expected_checksum = calculate_checksum(&buffer[..message_length]);
        let actual_checksum =
            u16::from_be_bytes([buffer[message_length], buffer[message_length + 1]]);

        if expected_checksum != actual_checksum {
            return Err(RdmDeserializationError::WrongChecksum);
        }

        Ok(Self { bytes: buffer })
    }

    fn view(&self) -> rdm_header_layout::View<&'a [u8]> {
        rdm_header_layout::View::new(self.bytes)
    }

    pub fn message_length(&self) -> u8 {
        self.view().message_length().read()
    }

    /// Total size on the wire: message length plus checksum.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn destination(&self) -> Uid {
        Uid::from_bytes(self.view().destination_uid())
    }

    pub fn source(&self) -> Uid {
        Uid::from_bytes(self.view().source_uid())
    }

    pub fn transaction_number(&self) -> u8 {
        self.view().transaction_number().read()
    }

    pub fn port_id_response_type(&self) -> u8 {
        self.view().port_id_response_type().read()
    }

    pub fn message_count(&self) -> u8 {
        self.view().message_count().read()
    }

    pub fn sub_device(&self) -> u16 {
        self.view().sub_device().read()
    }

    pub fn command_class(&self) -> u8 {
        self.view().command_class().read()
    }

    pub fn pid(&self) -> u16 {
        self.view().parameter_id().read()
    }

    pub fn parameter_data_length(&self) -> u8 {
        self.view().parameter_data_length().read()
    }

    pub fn parameter_data(&self) -> &'a [u8] {
        &self.bytes[RDM_HEADER_SIZE..self.bytes.len() - RDM_CHECKSUM_SIZE]
    }

    pub fn checksum(&self) -> u16 {
        let size = self.bytes.len();
        u16::from_be_bytes([self.bytes[size - 2], self.bytes[size - 1]])
    }

    /// Reads a field from the parameter data at `offset`.
    pub fn pd_at<T: ParameterField>(&self, offset: usize) -> Result<T, CodecError> {
        let parameter_data = self.parameter_data();

        if offset + T::SIZE > parameter_data.len() {
            return Err(CodecError::OutOfRange {
                offset,
                size: T::SIZE,
                parameter_data_length: parameter_data.len(),
            });
        }

        Ok(T::read_be(&parameter_data[offset..offset + T::SIZE]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn header() -> RdmHeader {
        RdmHeader {
            destination: Uid::new(0x4D41, 0x0102_0304),
            source: Uid::new(0x7FF0, 0x0000_0001),
            transaction_number: 7,
            port_id_response_type: 1,
            message_count: 0,
            sub_device: 0,
            command_class: 0x20,
            parameter_id: 0x1000,
        }
    }

    #[test]
    fn test_empty_package_layout() {
        let package = RdmPacketBuilder::new(&header()).finalize();

        assert_eq!(package.len(), 26);
        assert_eq!(package[0], SC_RDM);
        assert_eq!(package[1], SC_SUB_MESSAGE);
        assert_eq!(package[2], 24);
        assert_eq!(&package[3..9], &[0x4D, 0x41, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(package[20], 0x20);
        assert_eq!(&package[21..23], &[0x10, 0x00]);
        assert_eq!(package[23], 0);

        let checksum = calculate_checksum(&package[..24]);
        assert_eq!(&package[24..], &checksum.to_be_bytes());
    }

    #[test]
    fn test_fields_round_trip() {
        let mut builder = RdmPacketBuilder::new(&header());
        builder
            .add_field(0x01, 1)
            .unwrap()
            .add_field(0x0203, 2)
            .unwrap()
            .add(&Uid::new(0x1234, 0x5678_9ABC))
            .unwrap()
            .add(&0xDEAD_BEEFu32)
            .unwrap();
        assert_eq!(builder.parameter_data_length(), 13);

        let package = builder.finalize();
        let view = RdmPacketView::decode(&package).unwrap();

        assert_eq!(view.message_length(), 24 + 13);
        assert_eq!(view.size(), 24 + 13 + 2);
        assert_eq!(view.destination(), Uid::new(0x4D41, 0x0102_0304));
        assert_eq!(view.source(), Uid::new(0x7FF0, 1));
        assert_eq!(view.command_class(), 0x20);
        assert_eq!(view.pid(), 0x1000);
        assert_eq!(view.pd_at::<u8>(0).unwrap(), 0x01);
        assert_eq!(view.pd_at::<u16>(1).unwrap(), 0x0203);
        assert_eq!(view.pd_at::<Uid>(3).unwrap(), Uid::new(0x1234, 0x5678_9ABC));
        assert_eq!(view.pd_at::<u32>(9).unwrap(), 0xDEAD_BEEF);
        assert_eq!(&view.parameter_data()[1..3], &[0x02, 0x03]);
    }

    #[test]
    fn test_pd_at_out_of_range() {
        let mut builder = RdmPacketBuilder::new(&header());
        builder.add_field(0xABCD, 2).unwrap();
        let package = builder.finalize();
        let view = RdmPacketView::decode(&package).unwrap();

        assert_eq!(view.pd_at::<u16>(0).unwrap(), 0xABCD);
        assert_eq!(
            view.pd_at::<u16>(1),
            Err(CodecError::OutOfRange {
                offset: 1,
                size: 2,
                parameter_data_length: 2
            })
        );
        view.pd_at::<u32>(0).unwrap_err();
    }

    #[test]
    fn test_parameter_data_limit() {
        let mut builder = RdmPacketBuilder::new(&header());
        builder
            .add_bytes(&[0u8; RDM_MAX_PARAMETER_DATA_LENGTH])
            .unwrap();
        assert_eq!(
            builder.add_field(1, 1).err(),
            Some(CodecError::ParameterDataFull)
        );
        assert_eq!(builder.finalize().len(), RDM_MAX_PACKAGE_SIZE);

        let mut builder = RdmPacketBuilder::new(&header());
        assert_eq!(
            builder.add_field(1, 9).err(),
            Some(CodecError::FieldTooWide(9))
        );
    }

    #[test]
    fn test_decode_rejects_damage() {
        let package = RdmPacketBuilder::new(&header()).finalize();

        let mut wrong_checksum = package.clone();
        wrong_checksum[25] ^= 0x01;
        assert_eq!(
            RdmPacketView::decode(&wrong_checksum).unwrap_err(),
            RdmDeserializationError::WrongChecksum
        );

        let mut wrong_start_code = package.clone();
        wrong_start_code[1] = 0x02;
        assert_eq!(
            RdmPacketView::decode(&wrong_start_code).unwrap_err(),
            RdmDeserializationError::WrongStartCode
        );

        assert_eq!(
            RdmPacketView::decode(&package[..25]).unwrap_err(),
            RdmDeserializationError::BufferTooSmall
        );

        let mut wrong_length = heapless::Vec::<u8, 64>::from_slice(&package).unwrap();
        wrong_length.insert(24, 0).unwrap();
        assert!(matches!(
            RdmPacketView::decode(&wrong_length).unwrap_err(),
            RdmDeserializationError::WrongMessageLength(24)
        ));
    }

    #[test]
    fn test_checksum_has_no_carry() {
        assert_eq!(calculate_checksum(&[0xFF; 258]), (0xFFu32 * 258 % 0x1_0000) as u16);
        assert_eq!(calculate_checksum(&[]), 0);
    }

    proptest! {
        #[test]
        fn prop_encode_decode_reproduces_fields(
            destination in 0u64..=0xFFFF_FFFF_FFFF,
            source in 0u64..=0xFFFF_FFFF_FFFF,
            transaction_number: u8,
            port_id: u8,
            message_count: u8,
            sub_device: u16,
            command_class: u8,
            parameter_id: u16,
            parameter_data in proptest::collection::vec(any::<u8>(), 0..=RDM_MAX_PARAMETER_DATA_LENGTH),
        ) {
            let header = RdmHeader {
                destination: Uid::from_u64(destination),
                source: Uid::from_u64(source),
                transaction_number,
                port_id_response_type: port_id,
                message_count,
                sub_device,
                command_class,
                parameter_id,
            };
            let mut builder = RdmPacketBuilder::new(&header);
            builder.add_bytes(&parameter_data).unwrap();
            let package = builder.finalize();

            prop_assert_eq!(package[2] as usize, 24 + parameter_data.len());
            prop_assert_eq!(package.len(), package[2] as usize + 2);

            let view = RdmPacketView::decode(&package).unwrap();
            prop_assert_eq!(view.destination(), header.destination);
            prop_assert_eq!(view.source(), header.source);
            prop_assert_eq!(view.transaction_number(), transaction_number);
            prop_assert_eq!(view.port_id_response_type(), port_id);
            prop_assert_eq!(view.message_count(), message_count);
            prop_assert_eq!(view.sub_device(), sub_device);
            prop_assert_eq!(view.command_class(), command_class);
            prop_assert_eq!(view.pid(), parameter_id);
            prop_assert_eq!(view.parameter_data(), &parameter_data[..]);
        }
    }
}

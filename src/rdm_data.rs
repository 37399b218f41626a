use crate::command_class::{is_request_command_class, RequestCommandClass, ResponseCommandClass};
use crate::rdm_codec::{BinaryRdmPackage, RdmHeader, RdmPacketBuilder, RdmPacketView};
pub use crate::rdm_codec::RdmDeserializationError;
use crate::types::{DataPack, ResponseType};
use crate::unique_identifier::{PackageAddress, Uid};

/// Error that gets raised when attempting to convert an [RdmRequestData] object
/// to a [RdmResponseData] object that contains a broadcast destination address.
#[derive(Debug, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("tried to convert broadcast request to response")]
pub struct IsBroadcastError;

/// An RDM Request package that does not have its parameter data deserialized.
#[derive(Debug, Clone)]
pub struct RdmRequestData {
    pub destination_uid: PackageAddress,
    pub source_uid: Uid,
    pub transaction_number: u8,
    pub port_id: u8,
    pub message_count: u8,
    pub sub_device: u16,
    pub command_class: RequestCommandClass,
    pub parameter_id: u16,
    pub parameter_data: DataPack,
}

impl RdmRequestData {
    pub fn build_response(
        &self,
        response_type: ResponseType,
        response: DataPack,
        message_count: u8,
    ) -> Result<RdmResponseData, IsBroadcastError> {
        Ok(RdmResponseData {
            destination_uid: PackageAddress::Device(self.source_uid),
            source_uid: match self.destination_uid {
                PackageAddress::Device(uid) => uid,
                _ => return Err(IsBroadcastError),
            },
            transaction_number: self.transaction_number,
            response_type,
            message_count,
            sub_device: self.sub_device,
            command_class: self.command_class.get_response_class(),
            parameter_id: self.parameter_id,
            parameter_data: response,
        })
    }
}

/// An RDM Response package that does not have its parameter data deserialized.
#[derive(Debug, Clone)]
pub struct RdmResponseData {
    pub destination_uid: PackageAddress,
    pub source_uid: Uid,
    pub transaction_number: u8,
    pub response_type: ResponseType,
    pub message_count: u8,
    pub sub_device: u16,
    pub command_class: ResponseCommandClass,
    pub parameter_id: u16,
    pub parameter_data: DataPack,
}

#[derive(Debug, Clone)]
pub enum RdmData {
    Request(RdmRequestData),
    Response(RdmResponseData),
}

impl RdmData {
    pub fn deserialize(buf: &[u8]) -> Result<Self, RdmDeserializationError> {
        deserialize_rdm_data(buf)
    }

    pub fn serialize(&self) -> BinaryRdmPackage {
        serialize_rdm_data(self)
    }
}

/// Deserialize rdm data, start code included.
pub fn deserialize_rdm_data(buffer: &[u8]) -> Result<RdmData, RdmDeserializationError> {
    let view = RdmPacketView::decode(buffer)?;

    let source_uid = view.source();
    if source_uid.is_broadcast() {
        return Err(RdmDeserializationError::SourceUidIsBroadcast);
    }

    let mut parameter_data = DataPack::new();
    parameter_data
        .extend_from_slice(view.parameter_data())
        .map_err(|_| RdmDeserializationError::BufferTooBig)?;

    let command_class_field = view.command_class();

    let rdm_data = if is_request_command_class(command_class_field) {
        RdmData::Request(RdmRequestData {
            destination_uid: PackageAddress::from_uid(view.destination()),
            source_uid,
            transaction_number: view.transaction_number(),
            port_id: view.port_id_response_type(),
            message_count: view.message_count(),
            sub_device: view.sub_device(),
            command_class: command_class_field
                .try_into()
                .map_err(|_| RdmDeserializationError::CommandClassNotFound(command_class_field))?,
            parameter_id: view.pid(),
            parameter_data,
        })
    } else {
        let response_type_field = view.port_id_response_type();
        let response_type = response_type_field
            .try_into()
            .map_err(|_| RdmDeserializationError::ResponseTypeNotFound(response_type_field))?;

        RdmData::Response(RdmResponseData {
            destination_uid: PackageAddress::from_uid(view.destination()),
            source_uid,
            transaction_number: view.transaction_number(),
            response_type,
            message_count: view.message_count(),
            sub_device: view.sub_device(),
            command_class: command_class_field
                .try_into()
                .map_err(|_| RdmDeserializationError::CommandClassNotFound(command_class_field))?,
            parameter_id: view.pid(),
            parameter_data,
        })
    };

    Ok(rdm_data)
}

/// Serializes RDM data to a binary Vec.
pub fn serialize_rdm_data(rdm_data: &RdmData) -> BinaryRdmPackage {
    let (header, parameter_data) = match rdm_data {
        RdmData::Request(request) => (
            RdmHeader {
                destination: request.destination_uid.uid(),
                source: request.source_uid,
                transaction_number: request.transaction_number,
                port_id_response_type: request.port_id,
                message_count: request.message_count,
                sub_device: request.sub_device,
                command_class: request.command_class as u8,
                parameter_id: request.parameter_id,
            },
            &request.parameter_data,
        ),
        RdmData::Response(response) => (
            RdmHeader {
                destination: response.destination_uid.uid(),
                source: response.source_uid,
                transaction_number: response.transaction_number,
                port_id_response_type: response.response_type as u8,
                message_count: response.message_count,
                sub_device: response.sub_device,
                command_class: response.command_class as u8,
                parameter_id: response.parameter_id,
            },
            &response.parameter_data,
        ),
    };

    let mut builder = RdmPacketBuilder::new(&header);
    // a DataPack never exceeds the parameter data limit
    let _ = builder.add_bytes(parameter_data);

    builder.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pids;

    fn request() -> RdmRequestData {
        RdmRequestData {
            destination_uid: PackageAddress::Device(Uid::new(0x4D41, 0x22)),
            source_uid: Uid::new(0x7FF0, 0x01),
            transaction_number: 3,
            port_id: 1,
            message_count: 0,
            sub_device: 0,
            command_class: RequestCommandClass::SetCommand,
            parameter_id: pids::IDENTIFY_DEVICE,
            parameter_data: DataPack::from_slice(&[1]).unwrap(),
        }
    }

    #[test]
    fn test_request_round_trip() {
        let package = RdmData::Request(request()).serialize();
        assert_eq!(package.len(), 27);

        match RdmData::deserialize(&package).unwrap() {
            RdmData::Request(decoded) => {
                assert_eq!(decoded.destination_uid, request().destination_uid);
                assert_eq!(decoded.source_uid, request().source_uid);
                assert_eq!(decoded.command_class, RequestCommandClass::SetCommand);
                assert_eq!(decoded.parameter_id, pids::IDENTIFY_DEVICE);
                assert_eq!(&decoded.parameter_data[..], &[1]);
            },
            RdmData::Response(_) => panic!("decoded a request as response"),
        }
    }

    #[test]
    fn test_response_round_trip() {
        let response = request()
            .build_response(ResponseType::ResponseTypeAck, DataPack::new(), 2)
            .unwrap();
        assert_eq!(response.destination_uid, PackageAddress::Device(Uid::new(0x7FF0, 0x01)));
        assert_eq!(response.source_uid, Uid::new(0x4D41, 0x22));

        let package = RdmData::Response(response).serialize();
        match RdmData::deserialize(&package).unwrap() {
            RdmData::Response(decoded) => {
                assert_eq!(decoded.command_class, ResponseCommandClass::SetCommandResponse);
                assert_eq!(decoded.response_type, ResponseType::ResponseTypeAck);
                assert_eq!(decoded.message_count, 2);
                assert_eq!(decoded.transaction_number, 3);
            },
            RdmData::Request(_) => panic!("decoded a response as request"),
        }
    }

    #[test]
    fn test_broadcast_request_has_no_response() {
        let mut broadcast = request();
        broadcast.destination_uid = PackageAddress::Broadcast;

        broadcast
            .build_response(ResponseType::ResponseTypeAck, DataPack::new(), 0)
            .unwrap_err();
    }

    #[test]
    fn test_broadcast_source_is_rejected() {
        let mut bad_source = request();
        bad_source.source_uid = Uid::BROADCAST;
        let package = RdmData::Request(bad_source).serialize();

        assert!(matches!(
            RdmData::deserialize(&package),
            Err(RdmDeserializationError::SourceUidIsBroadcast)
        ));
    }
}

use crate::command_class::RequestCommandClass;
use crate::consts::{DMX_MAX_SLOTS, DMX_NULL_START};
use crate::discovery_reply::DiscoveryReply;
use crate::dmx_frame::Dmx512Frame;
use crate::dmx_port::{PortError, TransactionOutcome};
use crate::pids;
use crate::port_task::DmxPortHandle;
use crate::rdm_data::{RdmData, RdmDeserializationError, RdmRequestData, RdmResponseData};
use crate::rdm_types::{DeserializationError, DiscoveryMuteResponse};
use crate::types::{DataPack, NackReason, ResponseType};
use crate::unique_identifier::{PackageAddress, Uid};

/// Parameter ids reported by SUPPORTED_PARAMETERS.
pub type SupportedParameters = heapless::Vec<u16, 115>;

#[derive(Debug, Clone)]
pub struct RdmControllerConfig {
    pub rdm_uid: Uid,
    /// RDM port id put into every request, starting at 1.
    pub port_id: u8,
}

impl Default for RdmControllerConfig {
    fn default() -> Self {
        Self {
            rdm_uid: Uid::new(0x7FF0, 0), // prototyping id
            port_id: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RdmRequest {
    /// The unique id of the recipient of the request.
    pub destination_uid: PackageAddress,
    /// The id that specifies the type of the package.
    pub parameter_id: u16,
    /// The parameter data.
    pub data: DataPack,
}

impl RdmRequest {
    /// Creates an RdmRequest with empty parameter data.
    pub fn empty(uid: PackageAddress, pid: u16) -> Self {
        Self {
            destination_uid: uid,
            parameter_id: pid,
            data: DataPack::new(),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RdmResponseInfo {
    pub parameter_id: u16,
    pub message_count: u8,
    pub data: DataPack,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RdmResponse {
    /// The message data of the response.
    Response(RdmResponseInfo),
    /// The request has been excepted but the message data is too big to fit into one response.
    /// Use the get command on the same pid to receive the rest of it until you just receive a Response.
    IncompleteResponse(RdmResponseInfo),
    /// No response was received since the request was a broadcast.
    RequestWasBroadcast,
}

#[derive(Debug, thiserror::Error)]
pub enum RdmResponseError {
    /// The received package doesn't match the request.
    #[error("response does not match the request")]
    NotMatching,
    /// The parameter data couldn't be deserialized.
    #[error("parameter data is not deserializable")]
    ParameterDataNotDeserializable,
    /// The response has an error status but the contents aren't deserializable.
    #[error("error response is not deserializable")]
    ErrorNotDeserializable,
    /// The response isn't ready yet. The value is the estimated time in 100ms steps.
    #[error("response not ready, retry in {0} x 100ms")]
    NotReady(u16),
    /// The responder didn't acknowledge the request.
    #[error("request not acknowledged: {0:?}")]
    NotAcknowledged(NackReason),
    /// Nobody answered in time.
    #[error("no response")]
    Timeout,
    /// A reply started but was cut short or failed its checksum.
    #[error("damaged response")]
    DamagedReply,
    #[error("malformed response: {0}")]
    Malformed(#[from] RdmDeserializationError),
    /// More than 512 slots.
    #[error("package of {0} slots is too big")]
    PackageTooBig(usize),
    #[error(transparent)]
    Port(#[from] PortError),
}

impl From<DeserializationError> for RdmResponseError {
    fn from(_: DeserializationError) -> Self {
        Self::ParameterDataNotDeserializable
    }
}

/// An RDM controller on top of a port task.
pub struct RdmController<U> {
    port: DmxPortHandle<U>,
    uid: Uid,
    port_id: u8,
    current_transaction_id: u8,
    last_message_count: u8,
}

impl<U> RdmController<U> {
    pub fn new(port: DmxPortHandle<U>, config: &RdmControllerConfig) -> Self {
        Self {
            port,
            uid: config.rdm_uid,
            port_id: config.port_id,
            current_transaction_id: 0,
            last_message_count: 0,
        }
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &DmxPortHandle<U> {
        &self.port
    }

    pub fn into_port(self) -> DmxPortHandle<U> {
        self.port
    }

    /// Returns the message count that was received on the last request using this instance.
    pub fn rdm_get_last_message_count(&self) -> u8 {
        self.last_message_count
    }

    /// Sends a dmx package. Package can't be bigger than 512 bytes.
    pub async fn send_dmx_package(&self, package: &[u8]) -> Result<(), RdmResponseError> {
        self.send_custom_package(DMX_NULL_START, package).await
    }

    /// Sends a package with a custom start code.
    pub async fn send_custom_package(
        &self,
        start_code: u8,
        package: &[u8],
    ) -> Result<(), RdmResponseError> {
        if package.len() > DMX_MAX_SLOTS {
            return Err(RdmResponseError::PackageTooBig(package.len()));
        }

        let frame = Dmx512Frame::with_startcode(self.port.port(), start_code, package);
        Ok(self.port.transmit(frame).await?)
    }

    fn next_request(
        &mut self,
        destination_uid: PackageAddress,
        command_class: RequestCommandClass,
        parameter_id: u16,
        parameter_data: DataPack,
    ) -> Dmx512Frame {
        self.current_transaction_id = self.current_transaction_id.wrapping_add(1);

        let package = RdmData::Request(RdmRequestData {
            destination_uid,
            source_uid: self.uid,
            transaction_number: self.current_transaction_id,
            port_id: self.port_id,
            message_count: 0,
            sub_device: 0,
            command_class,
            parameter_id,
            parameter_data,
        })
        .serialize();

        Dmx512Frame::rdm(self.port.port(), &package)
    }

    async fn rdm_request(
        &mut self,
        command_class: RequestCommandClass,
        request: RdmRequest,
    ) -> Result<RdmResponse, RdmResponseError> {
        let RdmRequest {
            destination_uid,
            parameter_id,
            data,
        } = request;
        let frame = self.next_request(destination_uid, command_class, parameter_id, data);

        if destination_uid.is_broadcast() {
            self.port.transmit(frame).await?;
            return Ok(RdmResponse::RequestWasBroadcast);
        }

        let reply = match self.port.transact(frame).await? {
            TransactionOutcome::Reply(reply) => reply,
            TransactionOutcome::Timeout => return Err(RdmResponseError::Timeout),
            TransactionOutcome::DamagedReply => return Err(RdmResponseError::DamagedReply),
            TransactionOutcome::Cancelled => return Err(PortError::Closed.into()),
            TransactionOutcome::Discovery(_) => return Err(RdmResponseError::NotMatching),
        };

        let response = match RdmData::deserialize(&reply.to_wire())? {
            RdmData::Request(_) => return Err(RdmResponseError::NotMatching),
            RdmData::Response(response) => response,
        };

        self.check_response(destination_uid, parameter_id, &response)?;
        self.last_message_count = response.message_count;

        let response_info = RdmResponseInfo {
            parameter_id: response.parameter_id,
            message_count: response.message_count,
            data: response.parameter_data,
        };

        match response.response_type {
            ResponseType::ResponseTypeAck => Ok(RdmResponse::Response(response_info)),
            ResponseType::ResponseTypeAckTimer => Err(RdmResponseError::NotReady(
                status_word(&response_info.data)?,
            )),
            ResponseType::ResponseTypeNackReason => {
                let nack_reason = status_word(&response_info.data)?
                    .try_into()
                    .or(Err(RdmResponseError::ErrorNotDeserializable))?;

                Err(RdmResponseError::NotAcknowledged(nack_reason))
            },
            ResponseType::ResponseTypeAckOverflow => {
                Ok(RdmResponse::IncompleteResponse(response_info))
            },
        }
    }

    fn check_response(
        &self,
        destination_uid: PackageAddress,
        parameter_id: u16,
        response: &RdmResponseData,
    ) -> Result<(), RdmResponseError> {
        let matches = response.transaction_number == self.current_transaction_id
            && response.destination_uid == PackageAddress::Device(self.uid)
            && response.source_uid == destination_uid.uid()
            && response.parameter_id == parameter_id;

        if !matches {
            log::debug!(
                "response {} from {} does not match request {} to {}",
                response.transaction_number,
                response.source_uid,
                self.current_transaction_id,
                destination_uid.uid()
            );
            return Err(RdmResponseError::NotMatching);
        }

        Ok(())
    }

    /// Sends a get request.
    pub async fn rdm_get(&mut self, request: RdmRequest) -> Result<RdmResponse, RdmResponseError> {
        self.rdm_request(RequestCommandClass::GetCommand, request).await
    }

    /// Sends a set request.
    pub async fn rdm_set(&mut self, request: RdmRequest) -> Result<RdmResponse, RdmResponseError> {
        self.rdm_request(RequestCommandClass::SetCommand, request).await
    }

    /// Sends a discovery request to a range of device ids and returns how the bus answered.
    pub async fn rdm_discover(
        &mut self,
        first_uid: Uid,
        last_uid: Uid,
    ) -> Result<DiscoveryReply, RdmResponseError> {
        let mut parameter_data = DataPack::new();
        // 12 bytes always fit
        let _ = parameter_data.extend_from_slice(&first_uid.to_bytes());
        let _ = parameter_data.extend_from_slice(&last_uid.to_bytes());

        let frame = self.next_request(
            PackageAddress::Broadcast,
            RequestCommandClass::DiscoveryCommand,
            pids::DISC_UNIQUE_BRANCH,
            parameter_data,
        );

        match self.port.transact(frame).await? {
            TransactionOutcome::Discovery(reply) => Ok(reply),
            TransactionOutcome::Timeout => Ok(DiscoveryReply::NoReply),
            TransactionOutcome::DamagedReply => Ok(DiscoveryReply::Collision),
            TransactionOutcome::Cancelled => Err(PortError::Closed.into()),
            TransactionOutcome::Reply(_) => Err(RdmResponseError::NotMatching),
        }
    }

    /// Mute device from discovery. It will not respond to discovery requests anymore.
    /// Returns None if the request was a broadcast.
    pub async fn rdm_disc_mute(
        &mut self,
        uid: PackageAddress,
    ) -> Result<Option<DiscoveryMuteResponse>, RdmResponseError> {
        let response = self
            .rdm_request(
                RequestCommandClass::DiscoveryCommand,
                RdmRequest::empty(uid, pids::DISC_MUTE),
            )
            .await?;

        deserialize_discovery_mute_response(&response)
    }

    /// Unmute device from discovery. It will respond to discovery requests again.
    /// Returns None if the request was a broadcast.
    pub async fn rdm_disc_un_mute(
        &mut self,
        uid: PackageAddress,
    ) -> Result<Option<DiscoveryMuteResponse>, RdmResponseError> {
        let response = self
            .rdm_request(
                RequestCommandClass::DiscoveryCommand,
                RdmRequest::empty(uid, pids::DISC_UN_MUTE),
            )
            .await?;

        deserialize_discovery_mute_response(&response)
    }

    /// Get the identify state in the rdm device (led for searching)
    pub async fn rdm_get_identify(&mut self, uid: Uid) -> Result<bool, RdmResponseError> {
        let response = self
            .rdm_get(RdmRequest::empty(
                PackageAddress::Device(uid),
                pids::IDENTIFY_DEVICE,
            ))
            .await?;

        match response {
            RdmResponse::Response(response_info) => match response_info.data[..] {
                [identify] => Ok(identify != 0),
                _ => Err(RdmResponseError::ParameterDataNotDeserializable),
            },
            _ => Err(RdmResponseError::ParameterDataNotDeserializable),
        }
    }

    /// Set the identify state in the rdm device (led for searching)
    pub async fn rdm_set_identify(
        &mut self,
        uid: PackageAddress,
        enabled: bool,
    ) -> Result<(), RdmResponseError> {
        let mut data = DataPack::new();
        let _ = data.push(enabled as u8);

        self.rdm_set(RdmRequest {
            destination_uid: uid,
            parameter_id: pids::IDENTIFY_DEVICE,
            data,
        })
        .await?;

        Ok(())
    }

    /// Get the parameter ids that are supported by the responder.
    ///
    /// <div class="warning">Note that this only includes optional parameter ids that are not
    /// required to be compliant with ANSI E1.20.</div>
    pub async fn rdm_get_supported_parameters(
        &mut self,
        uid: Uid,
    ) -> Result<SupportedParameters, RdmResponseError> {
        let response = self
            .rdm_get(RdmRequest::empty(
                PackageAddress::Device(uid),
                pids::SUPPORTED_PARAMETERS,
            ))
            .await?;

        let data = match response {
            RdmResponse::Response(response_info) => response_info.data,
            _ => return Err(RdmResponseError::ParameterDataNotDeserializable),
        };

        if data.len() % 2 != 0 {
            return Err(RdmResponseError::ParameterDataNotDeserializable);
        }

        Ok(data
            .chunks_exact(2)
            .map(|pid| u16::from_be_bytes([pid[0], pid[1]]))
            .collect())
    }
}

/// The two byte value of ACK_TIMER and NACK_REASON responses.
fn status_word(data: &[u8]) -> Result<u16, RdmResponseError> {
    match data {
        [high, low] => Ok(u16::from_be_bytes([*high, *low])),
        _ => Err(RdmResponseError::ErrorNotDeserializable),
    }
}

fn deserialize_discovery_mute_response(
    response: &RdmResponse,
) -> Result<Option<DiscoveryMuteResponse>, RdmResponseError> {
    Ok(match response {
        RdmResponse::Response(response_info) => Some(
            DiscoveryMuteResponse::deserialize(&response_info.data)
                .map_err(|_| RdmResponseError::ParameterDataNotDeserializable)?,
        ),
        RdmResponse::RequestWasBroadcast => None,
        RdmResponse::IncompleteResponse(_) => {
            return Err(RdmResponseError::ParameterDataNotDeserializable)
        },
    })
}

//! Device side RDM handling: the part of a responder that answers discovery and the parameters
//! every device has to support. Everything else is forwarded to a [RdmResponderHandler].

use crate::command_class::RequestCommandClass;
use crate::consts::{RDM_MAX_PARAMETER_DATA_LENGTH, SC_RDM};
use crate::discovery_reply::encode_discovery_response;
use crate::dmx_frame::Dmx512Frame;
use crate::pids;
use crate::rdm_data::{IsBroadcastError, RdmData, RdmRequestData, RdmResponseData};
use crate::rdm_types::DiscoveryMuteResponse;
use crate::types::{DataPack, NackReason, ResponseType};
use crate::unique_identifier::{PackageAddress, Uid};

const INTERNALLY_SUPPORTED_PIDS: [u16; 1] = [pids::IDENTIFY_DEVICE];

/// The result object of an RDM handler.
pub enum RdmResult {
    /// The package was acknowledged. The [DataPack] contains the response data.
    Acknowledged(DataPack),
    /// The message was not acknowledged. The [u16] is the [NackReason].
    NotAcknowledged(u16),
    /// The message was acknowledged but a result can not be delivered immediately. The [u16]
    /// contains the amount of time the controller has to wait in 100ms steps.
    AcknowledgedTimer(u16),
    /// The receiver does not respond with anything.
    NoResponse,
}

/// State of the [RdmResponder] a handler may look at or change.
pub struct RdmResponderContext<'a> {
    pub uid: Uid,
    /// true if the device won't respond to discovery requests.
    pub discovery_muted: &'a mut bool,
    pub identify: &'a mut bool,
}

/// Handles the rdm requests the [RdmResponder] doesn't handle itself.
pub trait RdmResponderHandler {
    type Error;

    fn handle_rdm(
        &mut self,
        _request: &RdmRequestData,
        _context: &mut RdmResponderContext,
    ) -> Result<RdmResult, Self::Error> {
        Ok(RdmResult::NotAcknowledged(NackReason::UnknownPid as u16))
    }
}

/// A handler that supports nothing beyond the built in parameters.
impl RdmResponderHandler for () {
    type Error = core::convert::Infallible;
}

pub enum RdmAnswer {
    /// Has to be sent with an uart break
    Response(RdmResponseData),
    /// Has to be sent without an uart break
    DiscoveryResponse(Uid),
    /// No response to send
    NoResponse,
}

impl RdmAnswer {
    /// The frame to hand to the port, if there is anything to send.
    pub fn into_frame(self, port: u8) -> Option<Dmx512Frame> {
        match self {
            RdmAnswer::Response(response) => Some(Dmx512Frame::rdm(
                port,
                &RdmData::Response(response).serialize(),
            )),
            RdmAnswer::DiscoveryResponse(uid) => Some(Dmx512Frame::discovery_reply(
                port,
                &encode_discovery_response(uid),
            )),
            RdmAnswer::NoResponse => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RdmResponderConfig {
    /// The unique id that is used as a source id in the packages.
    pub uid: Uid,
    /// Pids handled by the [RdmResponderHandler], reported through SUPPORTED_PARAMETERS.
    pub supported_pids: &'static [u16],
}

impl RdmResponderConfig {
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            supported_pids: &[],
        }
    }
}

pub struct RdmResponder {
    uid: Uid,
    supported_pids: &'static [u16],
    discovery_muted: bool,
    identify: bool,
}

impl RdmResponder {
    pub fn new(config: RdmResponderConfig) -> Self {
        Self {
            uid: config.uid,
            supported_pids: config.supported_pids,
            discovery_muted: false,
            identify: false,
        }
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn is_muted(&self) -> bool {
        self.discovery_muted
    }

    pub fn is_identifying(&self) -> bool {
        self.identify
    }

    /// Answers a received frame. Frames that aren't valid RDM requests are ignored.
    pub fn handle_frame<HandlerError>(
        &mut self,
        frame: &Dmx512Frame,
        handler: &mut dyn RdmResponderHandler<Error = HandlerError>,
    ) -> Result<Option<Dmx512Frame>, HandlerError> {
        if frame.startcode != SC_RDM {
            return Ok(None);
        }

        let request = match RdmData::deserialize(&frame.to_wire()) {
            Ok(RdmData::Request(request)) => request,
            Ok(RdmData::Response(_)) => return Ok(None),
            Err(error) => {
                log::debug!("ignoring malformed rdm package: {}", error);
                return Ok(None);
            },
        };

        Ok(self.handle_rdm_request(request, handler)?.into_frame(frame.port))
    }

    pub fn handle_rdm_request<HandlerError>(
        &mut self,
        request: RdmRequestData,
        handler: &mut dyn RdmResponderHandler<Error = HandlerError>,
    ) -> Result<RdmAnswer, HandlerError> {
        match request.destination_uid {
            PackageAddress::ManufacturerBroadcast(manufacturer_uid) => {
                if manufacturer_uid != self.uid.manufacturer_id() {
                    return Ok(RdmAnswer::NoResponse);
                }
            },
            PackageAddress::Device(device_uid) => {
                if self.uid != device_uid {
                    return Ok(RdmAnswer::NoResponse);
                }
            },
            PackageAddress::Broadcast => {},
        }

        if request.command_class == RequestCommandClass::DiscoveryCommand
            && ![
                pids::DISC_UNIQUE_BRANCH,
                pids::DISC_MUTE,
                pids::DISC_UN_MUTE,
            ]
            .contains(&request.parameter_id)
        {
            return Ok(RdmAnswer::NoResponse);
        }

        let response = match request.parameter_id {
            pids::DISC_UNIQUE_BRANCH => return Ok(self.handle_disc_unique_branch(&request)),
            pids::DISC_MUTE => self.handle_disc_mute(&request, true),
            pids::DISC_UN_MUTE => self.handle_disc_mute(&request, false),
            pids::IDENTIFY_DEVICE => self.handle_identify(&request),
            pids::SUPPORTED_PARAMETERS => self.handle_supported_parameters(&request),
            _ => {
                let mut context = RdmResponderContext {
                    uid: self.uid,
                    discovery_muted: &mut self.discovery_muted,
                    identify: &mut self.identify,
                };

                match handler.handle_rdm(&request, &mut context)? {
                    RdmResult::Acknowledged(response_data) => {
                        request.build_response(ResponseType::ResponseTypeAck, response_data, 0)
                    },
                    RdmResult::NotAcknowledged(nack_reason) => {
                        let mut parameter_data = DataPack::new();
                        let _ = parameter_data.extend_from_slice(&nack_reason.to_be_bytes());
                        request.build_response(
                            ResponseType::ResponseTypeNackReason,
                            parameter_data,
                            0,
                        )
                    },
                    RdmResult::AcknowledgedTimer(timer) => {
                        let mut parameter_data = DataPack::new();
                        let _ = parameter_data.extend_from_slice(&timer.to_be_bytes());
                        request.build_response(
                            ResponseType::ResponseTypeAckTimer,
                            parameter_data,
                            0,
                        )
                    },
                    RdmResult::NoResponse => return Ok(RdmAnswer::NoResponse),
                }
                .ok()
            },
        };

        // Broadcasts never get a response.
        Ok(match response {
            Some(response_data) => RdmAnswer::Response(response_data),
            None => RdmAnswer::NoResponse,
        })
    }

    fn handle_disc_unique_branch(&self, request: &RdmRequestData) -> RdmAnswer {
        if request.command_class != RequestCommandClass::DiscoveryCommand
            || request.parameter_data.len() != 12
        {
            return RdmAnswer::NoResponse;
        }

        let mut bounds = [[0u8; 6]; 2];
        bounds[0].copy_from_slice(&request.parameter_data[..6]);
        bounds[1].copy_from_slice(&request.parameter_data[6..]);
        let lower_bound = Uid::from_bytes(&bounds[0]);
        let upper_bound = Uid::from_bytes(&bounds[1]);

        if !self.discovery_muted && (lower_bound..=upper_bound).contains(&self.uid) {
            return RdmAnswer::DiscoveryResponse(self.uid);
        }

        RdmAnswer::NoResponse
    }

    fn handle_disc_mute(&mut self, request: &RdmRequestData, mute: bool) -> Option<RdmResponseData> {
        if request.command_class != RequestCommandClass::DiscoveryCommand {
            return build_nack(request, NackReason::UnsupportedCommandClass).ok();
        }

        if !request.parameter_data.is_empty() {
            return None;
        }

        self.discovery_muted = mute;
        self.build_disc_mute_response(request).ok()
    }

    fn handle_identify(&mut self, request: &RdmRequestData) -> Option<RdmResponseData> {
        if request.sub_device != 0 {
            return build_nack(request, NackReason::SubDeviceOutOfRange).ok();
        }

        match request.command_class {
            RequestCommandClass::GetCommand => {
                let mut parameter_data = DataPack::new();
                let _ = parameter_data.push(self.identify as u8);
                request.build_response(ResponseType::ResponseTypeAck, parameter_data, 0)
            },
            RequestCommandClass::SetCommand => match request.parameter_data.as_slice() {
                [identify @ (0 | 1)] => {
                    self.identify = *identify == 1;
                    log::debug!("{}: identify {}", self.uid, self.identify);
                    request.build_response(ResponseType::ResponseTypeAck, DataPack::new(), 0)
                },
                [_] => build_nack(request, NackReason::DataOutOfRange),
                _ => build_nack(request, NackReason::FormatError),
            },
            RequestCommandClass::DiscoveryCommand => {
                build_nack(request, NackReason::UnsupportedCommandClass)
            },
        }
        .ok()
    }

    fn handle_supported_parameters(&self, request: &RdmRequestData) -> Option<RdmResponseData> {
        if request.command_class != RequestCommandClass::GetCommand {
            return build_nack(request, NackReason::UnsupportedCommandClass).ok();
        }

        let mut parameter_data = DataPack::new();
        for pid in INTERNALLY_SUPPORTED_PIDS
            .iter()
            .chain(self.supported_pids.iter())
            .take(RDM_MAX_PARAMETER_DATA_LENGTH / 2)
        {
            let _ = parameter_data.extend_from_slice(&pid.to_be_bytes());
        }

        request
            .build_response(ResponseType::ResponseTypeAck, parameter_data, 0)
            .ok()
    }

    fn build_disc_mute_response(
        &self,
        request: &RdmRequestData,
    ) -> Result<RdmResponseData, IsBroadcastError> {
        request.build_response(
            ResponseType::ResponseTypeAck,
            DiscoveryMuteResponse::default().serialize(),
            0,
        )
    }
}

fn build_nack(
    request: &RdmRequestData,
    nack_reason: NackReason,
) -> Result<RdmResponseData, IsBroadcastError> {
    request.build_response(ResponseType::ResponseTypeNackReason, nack_reason.serialize(), 0)
}

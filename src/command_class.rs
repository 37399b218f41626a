/// Raised when a command class byte does not name a known class.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("command class {0:#04X} is unknown")]
pub struct UnknownCommandClass(pub u8);

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RequestCommandClass {
    DiscoveryCommand = 0x10,
    GetCommand = 0x20,
    SetCommand = 0x30,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ResponseCommandClass {
    DiscoveryCommandResponse = 0x11,
    GetCommandResponse = 0x21,
    SetCommandResponse = 0x31,
}

/// True only for DISCOVERY_COMMAND, GET_COMMAND and SET_COMMAND, never for their responses.
pub const fn is_request_command_class(command_class: u8) -> bool {
    matches!(command_class & 0xF0, 0x10 | 0x20 | 0x30) && command_class & 0x0F == 0
}

impl RequestCommandClass {
    /// Returns the corresponding response class.
    pub fn get_response_class(&self) -> ResponseCommandClass {
        match self {
            Self::DiscoveryCommand => ResponseCommandClass::DiscoveryCommandResponse,
            Self::GetCommand => ResponseCommandClass::GetCommandResponse,
            Self::SetCommand => ResponseCommandClass::SetCommandResponse,
        }
    }
}

impl ResponseCommandClass {
    /// Returns the corresponding request class.
    pub fn get_request_class(&self) -> RequestCommandClass {
        match self {
            Self::DiscoveryCommandResponse => RequestCommandClass::DiscoveryCommand,
            Self::GetCommandResponse => RequestCommandClass::GetCommand,
            Self::SetCommandResponse => RequestCommandClass::SetCommand,
        }
    }
}

impl TryFrom<u8> for RequestCommandClass {
    type Error = UnknownCommandClass;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x10 => Ok(Self::DiscoveryCommand),
            0x20 => Ok(Self::GetCommand),
            0x30 => Ok(Self::SetCommand),
            _ => Err(UnknownCommandClass(value)),
        }
    }
}

impl TryFrom<u8> for ResponseCommandClass {
    type Error = UnknownCommandClass;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x11 => Ok(Self::DiscoveryCommandResponse),
            0x21 => Ok(Self::GetCommandResponse),
            0x31 => Ok(Self::SetCommandResponse),
            _ => Err(UnknownCommandClass(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_classification() {
        assert!(is_request_command_class(0x10));
        assert!(is_request_command_class(0x20));
        assert!(is_request_command_class(0x30));

        assert!(!is_request_command_class(0x11));
        assert!(!is_request_command_class(0x21));
        assert!(!is_request_command_class(0x31));
        assert!(!is_request_command_class(0x00));
        assert!(!is_request_command_class(0x40));
    }

    #[test]
    fn test_class_pairs() {
        for request in [
            RequestCommandClass::DiscoveryCommand,
            RequestCommandClass::GetCommand,
            RequestCommandClass::SetCommand,
        ] {
            assert_eq!(request.get_response_class().get_request_class(), request);
            assert_eq!(
                request.get_response_class() as u8,
                request as u8 + 1,
            );
        }

        assert_eq!(
            RequestCommandClass::try_from(0x21),
            Err(UnknownCommandClass(0x21))
        );
    }
}

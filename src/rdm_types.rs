use crate::types::DataPack;
use crate::unique_identifier::Uid;
use modular_bitfield::bitfield;
use modular_bitfield::prelude::B12;

/// Parameter data that does not match the layout of the parameter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeserializationError {
    #[error("parameter data has {0} bytes")]
    WrongLength(usize),
    #[error("binding uid is a broadcast address")]
    BroadcastBindingUid,
}

/// Acknowledgement of DISC_MUTE and DISC_UN_MUTE.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DiscoveryMuteResponse {
    /// The responder is a proxy device.
    pub managed_proxy: bool,
    /// The responder supports sub devices.
    pub sub_device: bool,
    /// The responder is not operational before receiving a firmware update.
    pub boot_loader: bool,
    /// A proxy device has responded on behalf of another device.
    pub proxy_device: bool,
    /// Included if the responding device contains multiple responder ports.
    /// It is the uid of the primary port of the device.
    pub binding_uid: Option<Uid>,
}

#[bitfield]
struct DiscControlField {
    managed_proxy: bool,
    sub_device: bool,
    boot_loader: bool,
    proxy_device: bool,
    #[skip]
    reserved: B12,
}

impl DiscoveryMuteResponse {
    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializationError> {
        let (control_field, binding_uid) = match data.len() {
            2 => (data, None),
            8 => (&data[..2], Some(&data[2..8])),
            length => return Err(DeserializationError::WrongLength(length)),
        };

        let control_field = DiscControlField::from_bytes([control_field[0], control_field[1]]);
        let binding_uid = match binding_uid {
            None => None,
            Some(bytes) => {
                let mut uid_bytes = [0u8; 6];
                uid_bytes.copy_from_slice(bytes);
                let uid = Uid::from_bytes(&uid_bytes);
                if uid.is_broadcast() {
                    return Err(DeserializationError::BroadcastBindingUid);
                }
                Some(uid)
            },
        };

        Ok(Self {
            managed_proxy: control_field.managed_proxy(),
            sub_device: control_field.sub_device(),
            boot_loader: control_field.boot_loader(),
            proxy_device: control_field.proxy_device(),
            binding_uid,
        })
    }

    pub fn serialize(&self) -> DataPack {
        let disc_control_field = DiscControlField::new()
            .with_managed_proxy(self.managed_proxy)
            .with_sub_device(self.sub_device)
            .with_boot_loader(self.boot_loader)
            .with_proxy_device(self.proxy_device);

        // at most 8 bytes, always fits
        let mut data_pack = DataPack::new();
        let _ = data_pack.extend_from_slice(&disc_control_field.into_bytes());
        if let Some(binding_uid) = self.binding_uid {
            let _ = data_pack.extend_from_slice(&binding_uid.to_bytes());
        }

        data_pack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mute_response_with_binding_uid() {
        let response = DiscoveryMuteResponse {
            sub_device: true,
            binding_uid: Some(Uid::new(0x4D41, 7)),
            ..Default::default()
        };

        let data = response.serialize();
        assert_eq!(data.len(), 8);
        assert_eq!(DiscoveryMuteResponse::deserialize(&data).unwrap(), response);
    }

    #[test]
    fn test_mute_response_length() {
        assert_eq!(
            DiscoveryMuteResponse::deserialize(&[0, 0, 1]),
            Err(DeserializationError::WrongLength(3))
        );
        assert_eq!(
            DiscoveryMuteResponse::deserialize(&[0, 0]).unwrap(),
            DiscoveryMuteResponse::default()
        );
    }
}

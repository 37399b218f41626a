use crate::consts::{BROADCAST_UID, UID_MASK};

/// 48 bit RDM unique id: 16 bit manufacturer id followed by a 32 bit device id.
///
/// Ordering follows the numeric value, which is what discovery uses for its search ranges.
/// The manufacturer uids are assigned by the esta.
/// [more information](https://tsp.esta.org/tsp/working_groups/CP/mfctrIDs.php)
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Uid {
    manufacturer_id: u16,
    device_id: u32,
}

impl core::fmt::Display for Uid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04X}:{:08X}", self.manufacturer_id, self.device_id)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Uid {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{:04X}:{:08X}", self.manufacturer_id, self.device_id);
    }
}

impl Uid {
    /// Addresses every responder on the bus.
    pub const BROADCAST: Uid = Uid::new(0xFFFF, 0xFFFF_FFFF);

    pub const fn new(manufacturer_id: u16, device_id: u32) -> Self {
        Self {
            manufacturer_id,
            device_id,
        }
    }

    /// The all zero uid. Used as the source of a DISC_UNIQUE_BRANCH request nobody answered.
    pub const fn any() -> Self {
        Self::new(0, 0)
    }

    pub const fn broadcast() -> Self {
        Self::BROADCAST
    }

    /// Builds a uid from the lower 48 bits of `value`.
    pub const fn from_u64(value: u64) -> Self {
        let value = value & UID_MASK;
        Self::new((value >> u32::BITS) as u16, value as u32)
    }

    pub const fn as_u64(&self) -> u64 {
        ((self.manufacturer_id as u64) << u32::BITS) | self.device_id as u64
    }

    pub const fn manufacturer_id(&self) -> u16 {
        self.manufacturer_id
    }

    pub const fn device_id(&self) -> u32 {
        self.device_id
    }

    /// True for the global broadcast as well as manufacturer broadcasts.
    pub const fn is_broadcast(&self) -> bool {
        self.device_id == u32::MAX
    }

    pub fn to_bytes(&self) -> [u8; 6] {
        let mut buffer = [0u8; 6];

        buffer[..2].copy_from_slice(&self.manufacturer_id.to_be_bytes());
        buffer[2..].copy_from_slice(&self.device_id.to_be_bytes());

        buffer
    }

    pub fn from_bytes(buffer: &[u8; 6]) -> Self {
        Self::new(
            u16::from_be_bytes([buffer[0], buffer[1]]),
            u32::from_be_bytes([buffer[2], buffer[3], buffer[4], buffer[5]]),
        )
    }

    /// Splits `[low, high]` at the integer midpoint.
    ///
    /// The lower half ends at `mid - 1`, the upper half starts at `mid`.
    /// Returns `None` if the range holds a single uid.
    pub fn split_range(low: Uid, high: Uid) -> Option<((Uid, Uid), (Uid, Uid))> {
        let (low_value, high_value) = (low.as_u64(), high.as_u64());
        if high_value <= low_value {
            return None;
        }

        let mid = low_value + (high_value - low_value + 1) / 2;
        Some((
            (low, Uid::from_u64(mid - 1)),
            (Uid::from_u64(mid), high),
        ))
    }
}

impl From<u64> for Uid {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl From<Uid> for u64 {
    fn from(value: Uid) -> Self {
        value.as_u64()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PackageAddress {
    /// Broadcast to all devices.
    Broadcast,
    /// Broadcast to all devices from a specific manufacturer identified by the manufacturer id
    /// in the u16.
    ManufacturerBroadcast(u16),
    /// Send package to a specific device.
    Device(Uid),
}

impl PackageAddress {
    pub fn from_uid(uid: Uid) -> Self {
        if !uid.is_broadcast() {
            return Self::Device(uid);
        }

        if uid.manufacturer_id() == u16::MAX {
            Self::Broadcast
        } else {
            Self::ManufacturerBroadcast(uid.manufacturer_id())
        }
    }

    pub fn uid(&self) -> Uid {
        match self {
            Self::Broadcast => Uid::BROADCAST,
            Self::ManufacturerBroadcast(manufacturer_id) => Uid::new(*manufacturer_id, u32::MAX),
            Self::Device(uid) => *uid,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        !matches!(self, PackageAddress::Device(_))
    }

    /// True if a responder with `uid` has to process a package sent to this address.
    pub fn matches(&self, uid: Uid) -> bool {
        match self {
            Self::Broadcast => true,
            Self::ManufacturerBroadcast(manufacturer_id) => *manufacturer_id == uid.manufacturer_id(),
            Self::Device(device_uid) => *device_uid == uid,
        }
    }
}

impl From<PackageAddress> for u64 {
    fn from(value: PackageAddress) -> Self {
        match value {
            PackageAddress::Broadcast => BROADCAST_UID,
            address => address.uid().as_u64(),
        }
    }
}

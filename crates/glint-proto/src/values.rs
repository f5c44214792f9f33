//! Value enums carried inside messages.
//!
//! The numeric representation of each enum is part of the wire contract with
//! the firmware. Conversions from raw bytes are total: an unrecognized value
//! maps to the enum's `Unknown`-style variant so that newer firmware never
//! breaks decoding.

use serde::{Deserialize, Serialize};

/// Rolling state of a die.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RollState {
    #[default]
    Unknown = 0,
    /// The die settled on a face.
    OnFace = 1,
    /// The die is being picked up or moved by hand.
    Handling = 2,
    Rolling = 3,
    /// The die came to rest at an angle, with no face clearly up.
    Crooked = 4,
}

impl RollState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::OnFace,
            2 => Self::Handling,
            3 => Self::Rolling,
            4 => Self::Crooked,
            _ => Self::Unknown,
        }
    }
}

/// Charging state of a device battery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BatteryState {
    #[default]
    Ok = 0,
    Low = 1,
    Charging = 2,
    /// Fully charged but still on the charger.
    Done = 3,
    BadCharging = 4,
    Error = 5,
}

impl BatteryState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Low,
            2 => Self::Charging,
            3 => Self::Done,
            4 => Self::BadCharging,
            5 => Self::Error,
            _ => Self::Ok,
        }
    }

    /// Whether the device should be reported as "charging" to the
    /// application: actively charging, or full but still on the charger.
    pub fn is_charging_or_done(self) -> bool {
        matches!(self, Self::Charging | Self::Done)
    }
}

/// Die casing colorway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Colorway {
    #[default]
    Unknown = 0,
    OnyxBlack = 1,
    HematiteGrey = 2,
    MidnightGalaxy = 3,
    AuroraSky = 4,
    Clear = 5,
    Custom = 0xFF,
}

impl Colorway {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::OnyxBlack,
            2 => Self::HematiteGrey,
            3 => Self::MidnightGalaxy,
            4 => Self::AuroraSky,
            5 => Self::Clear,
            0xFF => Self::Custom,
            _ => Self::Unknown,
        }
    }
}

/// Kind of die.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DieType {
    #[default]
    Unknown = 0,
    D4 = 1,
    D6 = 2,
    D8 = 3,
    D10 = 4,
    D00 = 5,
    D12 = 6,
    D20 = 7,
    D6Pipped = 8,
    D6Fudge = 9,
}

impl DieType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::D4,
            2 => Self::D6,
            3 => Self::D8,
            4 => Self::D10,
            5 => Self::D00,
            6 => Self::D12,
            7 => Self::D20,
            8 => Self::D6Pipped,
            9 => Self::D6Fudge,
            _ => Self::Unknown,
        }
    }

    /// Best guess of the die type from its LED count, for firmware that
    /// reports an unknown type.
    pub fn estimate_from_led_count(led_count: u8) -> Self {
        match led_count {
            4 => Self::D4,
            6 => Self::D6,
            8 => Self::D8,
            10 => Self::D10,
            12 => Self::D12,
            20 => Self::D20,
            21 => Self::D6Pipped,
            _ => Self::Unknown,
        }
    }

    pub fn face_count(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::D4 => 4,
            Self::D6 | Self::D6Pipped | Self::D6Fudge => 6,
            Self::D8 => 8,
            Self::D10 | Self::D00 => 10,
            Self::D12 => 12,
            Self::D20 => 20,
        }
    }

    /// Converts a 0-based face index to the face value shown to the user.
    /// D10 faces read 0–9, D00 faces 00–90, fudge dice +1/0/-1.
    pub fn face_from_index(self, face_index: u8) -> i8 {
        match self {
            Self::D10 => face_index as i8,
            Self::D00 => (face_index as i8).saturating_mul(10),
            Self::D6Fudge => match face_index % 6 {
                0 | 5 => 0,
                1 | 2 => 1,
                _ => -1,
            },
            _ => face_index as i8 + 1,
        }
    }
}

/// Microcontroller model of a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChipModel {
    #[default]
    Unknown = 0,
    Nrf52810 = 1,
}

impl ChipModel {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Nrf52810,
            _ => Self::Unknown,
        }
    }
}

/// Telemetry/RSSI reporting mode requested from a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TelemetryRequestMode {
    #[default]
    Off = 0,
    /// Send a single report.
    Once = 1,
    /// Keep sending reports at the configured interval.
    Automatic = 2,
}

/// Power state changes that can be requested from a device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PowerOperation {
    TurnOff = 0,
    Reset = 1,
    /// Low power mode; the device wakes when moved.
    #[default]
    Sleep = 2,
}

/// Device response to a data-set transfer request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransferAck {
    /// The device is ready to receive the data.
    #[default]
    Download = 0,
    /// The device already holds data with the advertised hash.
    UpToDate = 1,
    /// Not enough storage on the device.
    NoMemory = 2,
}

impl TransferAck {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Download),
            1 => Some(Self::UpToDate),
            2 => Some(Self::NoMemory),
            _ => None,
        }
    }
}

/// Outcome of a store-value request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StoreValueResult {
    #[default]
    Success = 0,
    UnknownError = 1,
    StoreFull = 2,
    /// The value was outside the valid range (zero is not storable).
    InvalidRange = 3,
    NotPermitted = 4,
}

impl StoreValueResult {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::UnknownError,
            2 => Self::StoreFull,
            3 => Self::InvalidRange,
            4 => Self::NotPermitted,
            _ => Self::Success,
        }
    }
}

/// State of one coil slot on a charging case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SlotState {
    #[default]
    Off = 0,
    Charging = 1,
    /// Foreign object detected on the coil.
    Fod = 2,
}

impl SlotState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Charging,
            2 => Self::Fod,
            _ => Self::Off,
        }
    }
}

/// Battery controller charging policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum BatteryControllerMode {
    #[default]
    Default = 0,
    ForceDisableCharging = 1,
    /// Charge regardless of battery temperature.
    ForceEnableCharging = 2,
}

impl BatteryControllerMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ForceDisableCharging,
            2 => Self::ForceEnableCharging,
            _ => Self::Default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecognized_values_map_to_unknown() {
        assert_eq!(RollState::from_u8(200), RollState::Unknown);
        assert_eq!(Colorway::from_u8(42), Colorway::Unknown);
        assert_eq!(DieType::from_u8(99), DieType::Unknown);
    }

    #[test]
    fn test_battery_charging_or_done() {
        assert!(BatteryState::Charging.is_charging_or_done());
        assert!(BatteryState::Done.is_charging_or_done());
        assert!(!BatteryState::Ok.is_charging_or_done());
        assert!(!BatteryState::Low.is_charging_or_done());
    }

    #[test]
    fn test_die_type_estimation_from_led_count() {
        assert_eq!(DieType::estimate_from_led_count(20), DieType::D20);
        assert_eq!(DieType::estimate_from_led_count(21), DieType::D6Pipped);
        assert_eq!(DieType::estimate_from_led_count(7), DieType::Unknown);
    }

    #[test]
    fn test_face_values() {
        assert_eq!(DieType::D20.face_from_index(19), 20);
        assert_eq!(DieType::D10.face_from_index(0), 0);
        assert_eq!(DieType::D00.face_from_index(9), 90);
    }

    #[test]
    fn test_transfer_ack_rejects_unknown_codes() {
        assert_eq!(TransferAck::from_u8(1), Some(TransferAck::UpToDate));
        assert_eq!(TransferAck::from_u8(7), None);
    }
}

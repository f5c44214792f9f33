//! Chunks of the composite identification messages.
//!
//! Current firmware answers the identification request with a sequence of
//! self-sized chunks (see [`crate::chunk`]). Dice carry a few more fields
//! than chargers and controllers, so the die-specific chunk shapes live here
//! next to the shared ones.

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::constants::LEGACY_API_VERSION;
use crate::schema::{Field, FieldReader, FieldWriter, Wire};
use crate::values::{BatteryState, ChipModel, Colorway, DieType, RollState};

/// Firmware and API version numbers negotiated during identification.
///
/// Zero means "not yet known" and is treated as compatible by the message
/// compatibility gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiVersions {
    pub firmware_version: u16,
    pub settings_version: u16,
    pub compat_standard_api_version: u16,
    pub compat_extended_api_version: u16,
    pub compat_management_api_version: u16,
}

impl ApiVersions {
    /// Versions assumed for firmware that predates version negotiation.
    pub fn legacy() -> Self {
        Self {
            firmware_version: LEGACY_API_VERSION,
            settings_version: LEGACY_API_VERSION,
            compat_standard_api_version: LEGACY_API_VERSION,
            compat_extended_api_version: LEGACY_API_VERSION,
            compat_management_api_version: LEGACY_API_VERSION,
        }
    }
}

/// Firmware version chunk, identical for all device kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfoChunk {
    pub chunk_size: u8,
    pub firmware_version: u16,
    pub build_timestamp: u32,
    pub settings_version: u16,
    pub compat_standard_api_version: u16,
    pub compat_extended_api_version: u16,
    pub compat_management_api_version: u16,
}

impl VersionInfoChunk {
    pub fn versions(&self) -> ApiVersions {
        ApiVersions {
            firmware_version: self.firmware_version,
            settings_version: self.settings_version,
            compat_standard_api_version: self.compat_standard_api_version,
            compat_extended_api_version: self.compat_extended_api_version,
            compat_management_api_version: self.compat_management_api_version,
        }
    }
}

impl Default for VersionInfoChunk {
    fn default() -> Self {
        Self {
            chunk_size: Self::EXPECTED_SIZE as u8,
            firmware_version: 0,
            build_timestamp: 0,
            settings_version: 0,
            compat_standard_api_version: 0,
            compat_extended_api_version: 0,
            compat_management_api_version: 0,
        }
    }
}

impl Wire for VersionInfoChunk {
    const LAYOUT: &'static [Field] = &[
        Field::u8("chunk_size"),
        Field::u16("firmware_version"),
        Field::u32("build_timestamp"),
        Field::u16("settings_version"),
        Field::u16("compat_standard_api_version"),
        Field::u16("compat_extended_api_version"),
        Field::u16("compat_management_api_version"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.chunk_size);
        w.put(self.firmware_version);
        w.put(self.build_timestamp);
        w.put(self.settings_version);
        w.put(self.compat_standard_api_version);
        w.put(self.compat_extended_api_version);
        w.put(self.compat_management_api_version);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.chunk_size = r.u8();
        self.firmware_version = r.u16();
        self.build_timestamp = r.u32();
        self.settings_version = r.u16();
        self.compat_standard_api_version = r.u16();
        self.compat_extended_api_version = r.u16();
        self.compat_management_api_version = r.u16();
    }
}

impl Chunk for VersionInfoChunk {}

/// General info chunk of a die.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DieInfoChunk {
    pub chunk_size: u8,
    pub device_id: u32,
    pub chip_model: ChipModel,
    pub die_type: DieType,
    pub led_count: u8,
    pub colorway: Colorway,
}

impl Default for DieInfoChunk {
    fn default() -> Self {
        Self {
            chunk_size: Self::EXPECTED_SIZE as u8,
            device_id: 0,
            chip_model: ChipModel::Unknown,
            die_type: DieType::Unknown,
            led_count: 0,
            colorway: Colorway::Unknown,
        }
    }
}

impl Wire for DieInfoChunk {
    const LAYOUT: &'static [Field] = &[
        Field::u8("chunk_size"),
        Field::u32("device_id"),
        Field::u8("chip_model"),
        Field::u8("die_type"),
        Field::u8("led_count"),
        Field::u8("colorway"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.chunk_size);
        w.put(self.device_id);
        w.put(self.chip_model as u8);
        w.put(self.die_type as u8);
        w.put(self.led_count);
        w.put(self.colorway as u8);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.chunk_size = r.u8();
        self.device_id = r.u32();
        self.chip_model = ChipModel::from_u8(r.u8());
        self.die_type = DieType::from_u8(r.u8());
        self.led_count = r.u8();
        self.colorway = Colorway::from_u8(r.u8());
    }
}

impl Chunk for DieInfoChunk {}

/// General info chunk of a charger or controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfoChunk {
    pub chunk_size: u8,
    pub device_id: u32,
    pub chip_model: ChipModel,
    pub led_count: u8,
}

impl Default for DeviceInfoChunk {
    fn default() -> Self {
        Self {
            chunk_size: Self::EXPECTED_SIZE as u8,
            device_id: 0,
            chip_model: ChipModel::Unknown,
            led_count: 0,
        }
    }
}

impl Wire for DeviceInfoChunk {
    const LAYOUT: &'static [Field] = &[
        Field::u8("chunk_size"),
        Field::u32("device_id"),
        Field::u8("chip_model"),
        Field::u8("led_count"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.chunk_size);
        w.put(self.device_id);
        w.put(self.chip_model as u8);
        w.put(self.led_count);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.chunk_size = r.u8();
        self.device_id = r.u32();
        self.chip_model = ChipModel::from_u8(r.u8());
        self.led_count = r.u8();
    }
}

impl Chunk for DeviceInfoChunk {}

/// Name chunk; its size depends on the name it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameChunk {
    pub chunk_size: u8,
    pub name: String,
}

impl NameChunk {
    /// Builds a chunk with the declared size matching the name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            // Size byte + name bytes + NUL terminator.
            chunk_size: (name.len() + 2) as u8,
            name,
        }
    }
}

impl Default for NameChunk {
    fn default() -> Self {
        Self::new("")
    }
}

impl Wire for NameChunk {
    const LAYOUT: &'static [Field] = &[Field::u8("chunk_size"), Field::term_string("name")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.chunk_size);
        w.put_str(&self.name);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.chunk_size = r.u8();
        self.name = r.string();
    }
}

impl Chunk for NameChunk {
    const EXPECTED_SIZE: usize = 0;
}

/// Settings chunk of a die.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DieSettingsInfoChunk {
    pub chunk_size: u8,
    /// Hash of the profile currently stored on the die.
    pub profile_data_hash: u32,
    pub available_flash: u32,
    pub total_usable_flash: u32,
}

impl Default for DieSettingsInfoChunk {
    fn default() -> Self {
        Self {
            chunk_size: Self::EXPECTED_SIZE as u8,
            profile_data_hash: 0,
            available_flash: 0,
            total_usable_flash: 0,
        }
    }
}

impl Wire for DieSettingsInfoChunk {
    const LAYOUT: &'static [Field] = &[
        Field::u8("chunk_size"),
        Field::u32("profile_data_hash"),
        Field::u32("available_flash"),
        Field::u32("total_usable_flash"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.chunk_size);
        w.put(self.profile_data_hash);
        w.put(self.available_flash);
        w.put(self.total_usable_flash);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.chunk_size = r.u8();
        self.profile_data_hash = r.u32();
        self.available_flash = r.u32();
        self.total_usable_flash = r.u32();
    }
}

impl Chunk for DieSettingsInfoChunk {}

/// Settings chunk of a charger or controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsInfoChunk {
    pub chunk_size: u8,
    pub available_flash: u32,
    pub total_usable_flash: u32,
}

impl Default for SettingsInfoChunk {
    fn default() -> Self {
        Self {
            chunk_size: Self::EXPECTED_SIZE as u8,
            available_flash: 0,
            total_usable_flash: 0,
        }
    }
}

impl Wire for SettingsInfoChunk {
    const LAYOUT: &'static [Field] = &[
        Field::u8("chunk_size"),
        Field::u32("available_flash"),
        Field::u32("total_usable_flash"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.chunk_size);
        w.put(self.available_flash);
        w.put(self.total_usable_flash);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.chunk_size = r.u8();
        self.available_flash = r.u32();
        self.total_usable_flash = r.u32();
    }
}

impl Chunk for SettingsInfoChunk {}

/// Status chunk of a die: battery plus roll state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DieStatusInfoChunk {
    pub chunk_size: u8,
    pub battery_level_percent: u8,
    pub battery_state: BatteryState,
    pub roll_state: RollState,
    pub current_face_index: u8,
}

impl Default for DieStatusInfoChunk {
    fn default() -> Self {
        Self {
            chunk_size: Self::EXPECTED_SIZE as u8,
            battery_level_percent: 0,
            battery_state: BatteryState::Ok,
            roll_state: RollState::Unknown,
            current_face_index: 0,
        }
    }
}

impl Wire for DieStatusInfoChunk {
    const LAYOUT: &'static [Field] = &[
        Field::u8("chunk_size"),
        Field::u8("battery_level_percent"),
        Field::u8("battery_state"),
        Field::u8("roll_state"),
        Field::u8("current_face_index"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.chunk_size);
        w.put(self.battery_level_percent);
        w.put(self.battery_state as u8);
        w.put(self.roll_state as u8);
        w.put(self.current_face_index);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.chunk_size = r.u8();
        self.battery_level_percent = r.u8();
        self.battery_state = BatteryState::from_u8(r.u8());
        self.roll_state = RollState::from_u8(r.u8());
        self.current_face_index = r.u8();
    }
}

impl Chunk for DieStatusInfoChunk {}

/// Status chunk of a charger or controller: battery only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInfoChunk {
    pub chunk_size: u8,
    pub battery_level_percent: u8,
    pub battery_state: BatteryState,
}

impl Default for StatusInfoChunk {
    fn default() -> Self {
        Self {
            chunk_size: Self::EXPECTED_SIZE as u8,
            battery_level_percent: 0,
            battery_state: BatteryState::Ok,
        }
    }
}

impl Wire for StatusInfoChunk {
    const LAYOUT: &'static [Field] = &[
        Field::u8("chunk_size"),
        Field::u8("battery_level_percent"),
        Field::u8("battery_state"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.chunk_size);
        w.put(self.battery_level_percent);
        w.put(self.battery_state as u8);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.chunk_size = r.u8();
        self.battery_level_percent = r.u8();
        self.battery_state = BatteryState::from_u8(r.u8());
    }
}

impl Chunk for StatusInfoChunk {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{write_chunk, ChunkReader};

    #[test]
    fn test_expected_chunk_sizes_match_the_wire_contract() {
        assert_eq!(VersionInfoChunk::EXPECTED_SIZE, 15);
        assert_eq!(DieInfoChunk::EXPECTED_SIZE, 9);
        assert_eq!(DeviceInfoChunk::EXPECTED_SIZE, 7);
        assert_eq!(DieSettingsInfoChunk::EXPECTED_SIZE, 13);
        assert_eq!(SettingsInfoChunk::EXPECTED_SIZE, 9);
        assert_eq!(DieStatusInfoChunk::EXPECTED_SIZE, 5);
        assert_eq!(StatusInfoChunk::EXPECTED_SIZE, 3);
    }

    #[test]
    fn test_version_chunk_round_trip() {
        let chunk = VersionInfoChunk {
            firmware_version: 0x0102,
            build_timestamp: 1_700_000_000,
            settings_version: 0x0100,
            compat_standard_api_version: 0x0100,
            compat_extended_api_version: 0x0101,
            compat_management_api_version: 0x0100,
            ..VersionInfoChunk::default()
        };
        let mut buf = Vec::new();
        write_chunk(&mut buf, &chunk);
        let decoded: VersionInfoChunk = ChunkReader::new(&buf).read_chunk("version info");
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn test_name_chunk_declares_its_own_size() {
        let chunk = NameChunk::new("Wraith");
        assert_eq!(chunk.chunk_size as usize, "Wraith".len() + 2);
        let mut buf = Vec::new();
        write_chunk(&mut buf, &chunk);
        assert_eq!(buf.len(), chunk.chunk_size as usize);
    }

    #[test]
    fn test_older_firmware_status_chunk_missing_roll_fields() {
        // Only the size byte, battery level and battery state.
        let buf = [3u8, 80, BatteryState::Charging as u8];
        let decoded: DieStatusInfoChunk = ChunkReader::new(&buf).read_chunk("status info");
        assert_eq!(decoded.battery_level_percent, 80);
        assert_eq!(decoded.battery_state, BatteryState::Charging);
        assert_eq!(decoded.roll_state, RollState::Unknown);
        assert_eq!(decoded.current_face_index, 0);
    }
}

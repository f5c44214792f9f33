//! Message registry and codec for Glint dice.
//!
//! The type-tag numbering has to match up with the die firmware; reserved
//! and factory-test entries are kept so the table stays aligned with it.

use crate::chunk::{write_chunk, ChunkReader};
use crate::codec::ProtocolCodec;
use crate::constants::{FACE_MASK_ALL, MAX_MESSAGE_SIZE, MAX_NAME_BYTE_SIZE};
use crate::ident::{
    DieInfoChunk, DieSettingsInfoChunk, DieStatusInfoChunk, NameChunk, VersionInfoChunk,
};
use crate::schema::{deserialize, serialize, DecodeError, Field, FieldReader, FieldWriter, Message, Wire};
use crate::values::{
    BatteryControllerMode, BatteryState, Colorway, DieType, PowerOperation, RollState,
    StoreValueResult, TelemetryRequestMode,
};

// ── Message kinds ─────────────────────────────────────────────────────────────

/// All die message types. The value is the first byte of every message on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DieMessageKind {
    None = 0,
    WhoAreYou = 1,
    IAmADie = 2,
    RollState = 3,
    Telemetry = 4,
    BulkSetup = 5,
    BulkSetupAck = 6,
    BulkData = 7,
    BulkDataAck = 8,
    TransferAnimationSet = 9,
    TransferAnimationSetAck = 10,
    TransferAnimationSetFinished = 11,
    TransferSettings = 12,
    TransferSettingsAck = 13,
    TransferSettingsFinished = 14,
    TransferTestAnimationSet = 15,
    TransferTestAnimationSetAck = 16,
    TransferTestAnimationSetFinished = 17,
    DebugLog = 18,
    PlayAnimation = 19,
    PlayAnimationEvent = 20,
    StopAnimation = 21,
    RemoteAction = 22,
    RequestRollState = 23,
    RequestAnimationSet = 24,
    RequestSettings = 25,
    RequestTelemetry = 26,
    ProgramDefaultAnimationSet = 27,
    ProgramDefaultAnimationSetFinished = 28,
    Blink = 29,
    BlinkAck = 30,
    RequestDefaultAnimationSetColor = 31,
    DefaultAnimationSetColor = 32,
    RequestBatteryLevel = 33,
    BatteryLevel = 34,
    RequestRssi = 35,
    Rssi = 36,
    Calibrate = 37,
    CalibrateFace = 38,
    NotifyUser = 39,
    NotifyUserAck = 40,
    TestHardware = 41,
    StoreValue = 42,
    StoreValueAck = 43,
    SetTopLevelState = 44,
    ProgramDefaultParameters = 45,
    ProgramDefaultParametersFinished = 46,
    SetDesignAndColor = 47,
    SetDesignAndColorAck = 48,
    SetCurrentBehavior = 49,
    SetCurrentBehaviorAck = 50,
    SetName = 51,
    SetNameAck = 52,
    PowerOperation = 53,
    ExitValidation = 54,
    TransferInstantAnimationSet = 55,
    TransferInstantAnimationSetAck = 56,
    TransferInstantAnimationSetFinished = 57,
    PlayInstantAnimation = 58,
    StopAllAnimations = 59,
    RequestTemperature = 60,
    Temperature = 61,
    SetBatteryControllerMode = 62,
    Reserved = 63,
    Discharge = 64,
    BlinkId = 65,
    BlinkIdAck = 66,
    TransferTest = 67,
    TransferTestAck = 68,
    TransferTestFinished = 69,
    ClearSettings = 70,
    ClearSettingsAck = 71,
    // Factory-test messages.
    TestBulkSend = 72,
    TestBulkReceive = 73,
    SetAllLedsToColor = 74,
    AttractMode = 75,
    PrintNormals = 76,
    PrintA2dReadings = 77,
    LightUpFace = 78,
    SetLedToColor = 79,
    PrintAnimationControllerState = 80,
}

impl TryFrom<u8> for DieMessageKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        use DieMessageKind::*;
        Ok(match value {
            0 => None,
            1 => WhoAreYou,
            2 => IAmADie,
            3 => RollState,
            4 => Telemetry,
            5 => BulkSetup,
            6 => BulkSetupAck,
            7 => BulkData,
            8 => BulkDataAck,
            9 => TransferAnimationSet,
            10 => TransferAnimationSetAck,
            11 => TransferAnimationSetFinished,
            12 => TransferSettings,
            13 => TransferSettingsAck,
            14 => TransferSettingsFinished,
            15 => TransferTestAnimationSet,
            16 => TransferTestAnimationSetAck,
            17 => TransferTestAnimationSetFinished,
            18 => DebugLog,
            19 => PlayAnimation,
            20 => PlayAnimationEvent,
            21 => StopAnimation,
            22 => RemoteAction,
            23 => RequestRollState,
            24 => RequestAnimationSet,
            25 => RequestSettings,
            26 => RequestTelemetry,
            27 => ProgramDefaultAnimationSet,
            28 => ProgramDefaultAnimationSetFinished,
            29 => Blink,
            30 => BlinkAck,
            31 => RequestDefaultAnimationSetColor,
            32 => DefaultAnimationSetColor,
            33 => RequestBatteryLevel,
            34 => BatteryLevel,
            35 => RequestRssi,
            36 => Rssi,
            37 => Calibrate,
            38 => CalibrateFace,
            39 => NotifyUser,
            40 => NotifyUserAck,
            41 => TestHardware,
            42 => StoreValue,
            43 => StoreValueAck,
            44 => SetTopLevelState,
            45 => ProgramDefaultParameters,
            46 => ProgramDefaultParametersFinished,
            47 => SetDesignAndColor,
            48 => SetDesignAndColorAck,
            49 => SetCurrentBehavior,
            50 => SetCurrentBehaviorAck,
            51 => SetName,
            52 => SetNameAck,
            53 => PowerOperation,
            54 => ExitValidation,
            55 => TransferInstantAnimationSet,
            56 => TransferInstantAnimationSetAck,
            57 => TransferInstantAnimationSetFinished,
            58 => PlayInstantAnimation,
            59 => StopAllAnimations,
            60 => RequestTemperature,
            61 => Temperature,
            62 => SetBatteryControllerMode,
            63 => Reserved,
            64 => Discharge,
            65 => BlinkId,
            66 => BlinkIdAck,
            67 => TransferTest,
            68 => TransferTestAck,
            69 => TransferTestFinished,
            70 => ClearSettings,
            71 => ClearSettingsAck,
            72 => TestBulkSend,
            73 => TestBulkReceive,
            74 => SetAllLedsToColor,
            75 => AttractMode,
            76 => PrintNormals,
            77 => PrintA2dReadings,
            78 => LightUpFace,
            79 => SetLedToColor,
            80 => PrintAnimationControllerState,
            _ => return Err(()),
        })
    }
}

// ── Identification payloads ───────────────────────────────────────────────────

/// Identification response of a die running legacy firmware: a single flat
/// fixed-width struct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyIAmADie {
    pub led_count: u8,
    pub colorway: Colorway,
    pub die_type: DieType,
    /// Hash of the profile stored on the die.
    pub data_set_hash: u32,
    pub device_id: u32,
    pub available_flash_size: u16,
    /// UNIX timestamp in seconds of the firmware build.
    pub build_timestamp: u32,
    pub roll_state: RollState,
    pub current_face_index: u8,
    pub battery_level_percent: u8,
    pub battery_state: BatteryState,
}

impl Wire for LegacyIAmADie {
    const LAYOUT: &'static [Field] = &[
        Field::u8("led_count"),
        Field::u8("colorway"),
        Field::u8("die_type"),
        Field::u32("data_set_hash"),
        Field::u32("device_id"),
        Field::u16("available_flash_size"),
        Field::u32("build_timestamp"),
        Field::u8("roll_state"),
        Field::u8("current_face_index"),
        Field::u8("battery_level_percent"),
        Field::u8("battery_state"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.led_count);
        w.put(self.colorway as u8);
        w.put(self.die_type as u8);
        w.put(self.data_set_hash);
        w.put(self.device_id);
        w.put(self.available_flash_size);
        w.put(self.build_timestamp);
        w.put(self.roll_state as u8);
        w.put(self.current_face_index);
        w.put(self.battery_level_percent);
        w.put(self.battery_state as u8);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.led_count = r.u8();
        self.colorway = Colorway::from_u8(r.u8());
        self.die_type = DieType::from_u8(r.u8());
        self.data_set_hash = r.u32();
        self.device_id = r.u32();
        self.available_flash_size = r.u16();
        self.build_timestamp = r.u32();
        self.roll_state = RollState::from_u8(r.u8());
        self.current_face_index = r.u8();
        self.battery_level_percent = r.u8();
        self.battery_state = BatteryState::from_u8(r.u8());
    }
}

impl Message for LegacyIAmADie {
    const TAG: u8 = DieMessageKind::IAmADie as u8;
}

/// Identification response of a die running current firmware: a sequence of
/// self-sized chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IAmADie {
    pub version_info: VersionInfoChunk,
    pub die_info: DieInfoChunk,
    pub custom_design_name: NameChunk,
    pub die_name: NameChunk,
    pub settings_info: DieSettingsInfoChunk,
    pub status_info: DieStatusInfoChunk,
}

impl IAmADie {
    pub const TAG: u8 = DieMessageKind::IAmADie as u8;

    /// Decodes the chunk sequence following the type tag.
    pub fn decode_chunks(payload: &[u8]) -> Self {
        let mut r = ChunkReader::new(payload);
        let msg = Self {
            version_info: r.read_chunk("version info"),
            die_info: r.read_chunk("die info"),
            custom_design_name: r.read_chunk("custom design name"),
            die_name: r.read_chunk("die name"),
            settings_info: r.read_chunk("settings info"),
            status_info: r.read_chunk("status info"),
        };
        if r.remaining() > 0 {
            tracing::warn!(
                unread = r.remaining(),
                "identification payload has extra chunk bytes"
            );
        }
        msg
    }

    pub fn encode_chunks(&self) -> Vec<u8> {
        let mut buf = vec![Self::TAG];
        write_chunk(&mut buf, &self.version_info);
        write_chunk(&mut buf, &self.die_info);
        write_chunk(&mut buf, &self.custom_design_name);
        write_chunk(&mut buf, &self.die_name);
        write_chunk(&mut buf, &self.settings_info);
        write_chunk(&mut buf, &self.status_info);
        buf
    }
}

// ── Notification payloads ─────────────────────────────────────────────────────

/// Roll state notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollStateMessage {
    pub state: RollState,
    pub face_index: u8,
}

impl Wire for RollStateMessage {
    const LAYOUT: &'static [Field] = &[Field::u8("state"), Field::u8("face_index")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.state as u8);
        w.put(self.face_index);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.state = RollState::from_u8(r.u8());
        self.face_index = r.u8();
    }
}

impl Message for RollStateMessage {
    const TAG: u8 = DieMessageKind::RollState as u8;
}

/// Full telemetry report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    pub acc_x_times_1000: i16,
    pub acc_y_times_1000: i16,
    pub acc_z_times_1000: i16,
    pub face_confidence_times_1000: i32,
    /// Firmware time in milliseconds when the data was gathered.
    pub time_ms: u32,
    pub roll_state: RollState,
    pub face_index: u8,
    pub battery_level_percent: u8,
    pub battery_state: BatteryState,
    /// Raw state of the battery controller.
    pub battery_controller_state: u8,
    pub voltage_times_50: u8,
    pub v_coil_times_50: u8,
    pub rssi: i8,
    pub channel_index: u8,
    /// 0xFFFF when the die could not read the temperature.
    pub mcu_temperature_times_100: u16,
    pub battery_temperature_times_100: u16,
    pub internal_charge_state: bool,
    pub battery_controller_mode: BatteryControllerMode,
    pub led_current_ma: u8,
}

impl Wire for Telemetry {
    const LAYOUT: &'static [Field] = &[
        Field::i16("acc_x_times_1000"),
        Field::i16("acc_y_times_1000"),
        Field::i16("acc_z_times_1000"),
        Field::i32("face_confidence_times_1000"),
        Field::u32("time_ms"),
        Field::u8("roll_state"),
        Field::u8("face_index"),
        Field::u8("battery_level_percent"),
        Field::u8("battery_state"),
        Field::u8("battery_controller_state"),
        Field::u8("voltage_times_50"),
        Field::u8("v_coil_times_50"),
        Field::i8("rssi"),
        Field::u8("channel_index"),
        Field::u16("mcu_temperature_times_100"),
        Field::u16("battery_temperature_times_100"),
        Field::bool("internal_charge_state"),
        Field::u8("battery_controller_mode"),
        Field::u8("led_current_ma"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.acc_x_times_1000);
        w.put(self.acc_y_times_1000);
        w.put(self.acc_z_times_1000);
        w.put(self.face_confidence_times_1000);
        w.put(self.time_ms);
        w.put(self.roll_state as u8);
        w.put(self.face_index);
        w.put(self.battery_level_percent);
        w.put(self.battery_state as u8);
        w.put(self.battery_controller_state);
        w.put(self.voltage_times_50);
        w.put(self.v_coil_times_50);
        w.put(self.rssi);
        w.put(self.channel_index);
        w.put(self.mcu_temperature_times_100);
        w.put(self.battery_temperature_times_100);
        w.put_bool(self.internal_charge_state);
        w.put(self.battery_controller_mode as u8);
        w.put(self.led_current_ma);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.acc_x_times_1000 = r.i16();
        self.acc_y_times_1000 = r.i16();
        self.acc_z_times_1000 = r.i16();
        self.face_confidence_times_1000 = r.i32();
        self.time_ms = r.u32();
        self.roll_state = RollState::from_u8(r.u8());
        self.face_index = r.u8();
        self.battery_level_percent = r.u8();
        self.battery_state = BatteryState::from_u8(r.u8());
        self.battery_controller_state = r.u8();
        self.voltage_times_50 = r.u8();
        self.v_coil_times_50 = r.u8();
        self.rssi = r.i8();
        self.channel_index = r.u8();
        self.mcu_temperature_times_100 = r.u16();
        self.battery_temperature_times_100 = r.u16();
        self.internal_charge_state = r.bool();
        self.battery_controller_mode = BatteryControllerMode::from_u8(r.u8());
        self.led_current_ma = r.u8();
    }
}

impl Message for Telemetry {
    const TAG: u8 = DieMessageKind::Telemetry as u8;
}

// ── Bulk transfer payloads ────────────────────────────────────────────────────

/// Announces an upcoming bulk transfer of `size` bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSetup {
    pub size: u16,
}

impl Wire for BulkSetup {
    const LAYOUT: &'static [Field] = &[Field::u16("size")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.size);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.size = r.u16();
    }
}

impl Message for BulkSetup {
    const TAG: u8 = DieMessageKind::BulkSetup as u8;
}

/// One chunk of a bulk transfer. The data block is padded to the maximum
/// message size on the wire; only the first `size` bytes are meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkData {
    pub size: u8,
    pub offset: u16,
    pub data: Vec<u8>,
}

impl Wire for BulkData {
    const LAYOUT: &'static [Field] = &[
        Field::u8("size"),
        Field::u16("offset"),
        Field::bytes("data", MAX_MESSAGE_SIZE as u16),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.size);
        w.put(self.offset);
        w.put_bytes(&self.data);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.size = r.u8();
        self.offset = r.u16();
        self.data = r.bytes();
    }
}

impl Message for BulkData {
    const TAG: u8 = DieMessageKind::BulkData as u8;
}

/// Acknowledges the bulk chunk at `offset`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkDataAck {
    pub offset: u16,
}

impl Wire for BulkDataAck {
    const LAYOUT: &'static [Field] = &[Field::u16("offset")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.offset);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.offset = r.u16();
    }
}

impl Message for BulkDataAck {
    const TAG: u8 = DieMessageKind::BulkDataAck as u8;
}

// ── Animation data set transfers ──────────────────────────────────────────────

/// Requests the transfer of a full animation data set into flash memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferAnimationSet {
    pub palette_size: u16,
    pub rgb_keyframe_count: u16,
    pub rgb_track_count: u16,
    pub keyframe_count: u16,
    pub track_count: u16,
    pub animation_count: u16,
    pub animation_size: u16,
    pub condition_count: u16,
    pub condition_size: u16,
    pub action_count: u16,
    pub action_size: u16,
    pub rule_count: u16,
    pub brightness: u8,
}

impl Wire for TransferAnimationSet {
    const LAYOUT: &'static [Field] = &[
        Field::u16("palette_size"),
        Field::u16("rgb_keyframe_count"),
        Field::u16("rgb_track_count"),
        Field::u16("keyframe_count"),
        Field::u16("track_count"),
        Field::u16("animation_count"),
        Field::u16("animation_size"),
        Field::u16("condition_count"),
        Field::u16("condition_size"),
        Field::u16("action_count"),
        Field::u16("action_size"),
        Field::u16("rule_count"),
        Field::u8("brightness"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.palette_size);
        w.put(self.rgb_keyframe_count);
        w.put(self.rgb_track_count);
        w.put(self.keyframe_count);
        w.put(self.track_count);
        w.put(self.animation_count);
        w.put(self.animation_size);
        w.put(self.condition_count);
        w.put(self.condition_size);
        w.put(self.action_count);
        w.put(self.action_size);
        w.put(self.rule_count);
        w.put(self.brightness);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.palette_size = r.u16();
        self.rgb_keyframe_count = r.u16();
        self.rgb_track_count = r.u16();
        self.keyframe_count = r.u16();
        self.track_count = r.u16();
        self.animation_count = r.u16();
        self.animation_size = r.u16();
        self.condition_count = r.u16();
        self.condition_size = r.u16();
        self.action_count = r.u16();
        self.action_size = r.u16();
        self.rule_count = r.u16();
        self.brightness = r.u8();
    }
}

impl Message for TransferAnimationSet {
    const TAG: u8 = DieMessageKind::TransferAnimationSet as u8;
}

/// Response to [`TransferAnimationSet`]: nonzero means "go ahead".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferAnimationSetAck {
    pub result: u8,
}

impl Wire for TransferAnimationSetAck {
    const LAYOUT: &'static [Field] = &[Field::u8("result")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.result);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.result = r.u8();
    }
}

impl Message for TransferAnimationSetAck {
    const TAG: u8 = DieMessageKind::TransferAnimationSetAck as u8;
}

/// Requests the transfer of a test animation set into RAM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferTestAnimationSet {
    pub palette_size: u16,
    pub rgb_keyframe_count: u16,
    pub rgb_track_count: u16,
    pub keyframe_count: u16,
    pub track_count: u16,
    pub animation_count: u16,
    pub animation_size: u16,
    /// Content hash of the animation data, for up-to-date detection.
    pub hash: u32,
}

impl Wire for TransferTestAnimationSet {
    const LAYOUT: &'static [Field] = &[
        Field::u16("palette_size"),
        Field::u16("rgb_keyframe_count"),
        Field::u16("rgb_track_count"),
        Field::u16("keyframe_count"),
        Field::u16("track_count"),
        Field::u16("animation_count"),
        Field::u16("animation_size"),
        Field::u32("hash"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.palette_size);
        w.put(self.rgb_keyframe_count);
        w.put(self.rgb_track_count);
        w.put(self.keyframe_count);
        w.put(self.track_count);
        w.put(self.animation_count);
        w.put(self.animation_size);
        w.put(self.hash);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.palette_size = r.u16();
        self.rgb_keyframe_count = r.u16();
        self.rgb_track_count = r.u16();
        self.keyframe_count = r.u16();
        self.track_count = r.u16();
        self.animation_count = r.u16();
        self.animation_size = r.u16();
        self.hash = r.u32();
    }
}

impl Message for TransferTestAnimationSet {
    const TAG: u8 = DieMessageKind::TransferTestAnimationSet as u8;
}

/// Response to [`TransferTestAnimationSet`]. The raw code maps to
/// [`crate::values::TransferAck`]; unknown codes are kept for the caller to
/// reject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferTestAnimationSetAck {
    pub ack: u8,
}

impl Wire for TransferTestAnimationSetAck {
    const LAYOUT: &'static [Field] = &[Field::u8("ack")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.ack);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.ack = r.u8();
    }
}

impl Message for TransferTestAnimationSetAck {
    const TAG: u8 = DieMessageKind::TransferTestAnimationSetAck as u8;
}

/// Requests the transfer of a set of instant animations into RAM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferInstantAnimationSet {
    pub palette_size: u16,
    pub rgb_keyframe_count: u16,
    pub rgb_track_count: u16,
    pub keyframe_count: u16,
    pub track_count: u16,
    pub animation_count: u16,
    pub animation_size: u16,
    pub hash: u32,
}

impl Wire for TransferInstantAnimationSet {
    const LAYOUT: &'static [Field] = &[
        Field::u16("palette_size"),
        Field::u16("rgb_keyframe_count"),
        Field::u16("rgb_track_count"),
        Field::u16("keyframe_count"),
        Field::u16("track_count"),
        Field::u16("animation_count"),
        Field::u16("animation_size"),
        Field::u32("hash"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.palette_size);
        w.put(self.rgb_keyframe_count);
        w.put(self.rgb_track_count);
        w.put(self.keyframe_count);
        w.put(self.track_count);
        w.put(self.animation_count);
        w.put(self.animation_size);
        w.put(self.hash);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.palette_size = r.u16();
        self.rgb_keyframe_count = r.u16();
        self.rgb_track_count = r.u16();
        self.keyframe_count = r.u16();
        self.track_count = r.u16();
        self.animation_count = r.u16();
        self.animation_size = r.u16();
        self.hash = r.u32();
    }
}

impl Message for TransferInstantAnimationSet {
    const TAG: u8 = DieMessageKind::TransferInstantAnimationSet as u8;
}

/// Response to [`TransferInstantAnimationSet`]. The raw code maps to
/// [`crate::values::TransferAck`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferInstantAnimationSetAck {
    pub ack: u8,
}

impl Wire for TransferInstantAnimationSetAck {
    const LAYOUT: &'static [Field] = &[Field::u8("ack")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.ack);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.ack = r.u8();
    }
}

impl Message for TransferInstantAnimationSetAck {
    const TAG: u8 = DieMessageKind::TransferInstantAnimationSetAck as u8;
}

// ── Control and status payloads ───────────────────────────────────────────────

/// Log line forwarded by the firmware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugLog {
    pub message: String,
}

impl Wire for DebugLog {
    const LAYOUT: &'static [Field] = &[Field::term_string("message")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put_str(&self.message);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.message = r.string();
    }
}

impl Message for DebugLog {
    const TAG: u8 = DieMessageKind::DebugLog as u8;
}

/// Asks the application to run the remote action with the given id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAction {
    pub action_id: u16,
}

impl Wire for RemoteAction {
    const LAYOUT: &'static [Field] = &[Field::u16("action_id")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.action_id);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.action_id = r.u16();
    }
}

impl Message for RemoteAction {
    const TAG: u8 = DieMessageKind::RemoteAction as u8;
}

/// Starts or stops telemetry reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestTelemetry {
    pub request_mode: TelemetryRequestMode,
    /// Minimum interval between reports in milliseconds, 0 for no cap.
    pub min_interval: u16,
}

impl Wire for RequestTelemetry {
    const LAYOUT: &'static [Field] = &[Field::u8("request_mode"), Field::u16("min_interval")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.request_mode as u8);
        w.put(self.min_interval);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.request_mode = match r.u8() {
            1 => TelemetryRequestMode::Once,
            2 => TelemetryRequestMode::Automatic,
            _ => TelemetryRequestMode::Off,
        };
        self.min_interval = r.u16();
    }
}

impl Message for RequestTelemetry {
    const TAG: u8 = DieMessageKind::RequestTelemetry as u8;
}

/// Makes the die blink its LEDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blink {
    pub count: u8,
    /// Total duration in milliseconds.
    pub duration: u16,
    /// 32-bit color to blink.
    pub color: u32,
    /// Which faces to light up.
    pub face_mask: u32,
    /// 0 is a sharp transition, 255 maximum fading.
    pub fade: u8,
    pub loop_count: u8,
}

impl Default for Blink {
    fn default() -> Self {
        Self {
            count: 0,
            duration: 0,
            color: 0,
            face_mask: FACE_MASK_ALL,
            fade: 0,
            loop_count: 1,
        }
    }
}

impl Wire for Blink {
    const LAYOUT: &'static [Field] = &[
        Field::u8("count"),
        Field::u16("duration"),
        Field::u32("color"),
        Field::u32("face_mask"),
        Field::u8("fade"),
        Field::u8("loop_count"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.count);
        w.put(self.duration);
        w.put(self.color);
        w.put(self.face_mask);
        w.put(self.fade);
        w.put(self.loop_count);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.count = r.u8();
        self.duration = r.u16();
        self.color = r.u32();
        self.face_mask = r.u32();
        self.fade = r.u8();
        self.loop_count = r.u8();
    }
}

impl Message for Blink {
    const TAG: u8 = DieMessageKind::Blink as u8;
}

/// Battery level notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatteryLevel {
    pub level_percent: u8,
    pub state: BatteryState,
}

impl Wire for BatteryLevel {
    const LAYOUT: &'static [Field] = &[Field::u8("level_percent"), Field::u8("state")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.level_percent);
        w.put(self.state as u8);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.level_percent = r.u8();
        self.state = BatteryState::from_u8(r.u8());
    }
}

impl Message for BatteryLevel {
    const TAG: u8 = DieMessageKind::BatteryLevel as u8;
}

/// Configures RSSI reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestRssi {
    pub request_mode: TelemetryRequestMode,
    pub min_interval: u16,
}

impl Wire for RequestRssi {
    const LAYOUT: &'static [Field] = &[Field::u8("request_mode"), Field::u16("min_interval")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.request_mode as u8);
        w.put(self.min_interval);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.request_mode = match r.u8() {
            1 => TelemetryRequestMode::Once,
            2 => TelemetryRequestMode::Automatic,
            _ => TelemetryRequestMode::Off,
        };
        self.min_interval = r.u16();
    }
}

impl Message for RequestRssi {
    const TAG: u8 = DieMessageKind::RequestRssi as u8;
}

/// RSSI report in dBm.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rssi {
    pub value: i8,
}

impl Wire for Rssi {
    const LAYOUT: &'static [Field] = &[Field::i8("value")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.value);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.value = r.i8();
    }
}

impl Message for Rssi {
    const TAG: u8 = DieMessageKind::Rssi as u8;
}

/// Asks the application to show a message to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyUser {
    /// Seconds the die keeps listening for an answer.
    pub timeout_sec: u8,
    pub ok: bool,
    pub cancel: bool,
    pub message: String,
}

impl Wire for NotifyUser {
    const LAYOUT: &'static [Field] = &[
        Field::u8("timeout_sec"),
        Field::bool("ok"),
        Field::bool("cancel"),
        Field::string("message", (MAX_MESSAGE_SIZE - 4) as u16),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.timeout_sec);
        w.put_bool(self.ok);
        w.put_bool(self.cancel);
        w.put_str(&self.message);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.timeout_sec = r.u8();
        self.ok = r.bool();
        self.cancel = r.bool();
        self.message = r.string();
    }
}

impl Message for NotifyUser {
    const TAG: u8 = DieMessageKind::NotifyUser as u8;
}

/// Answer to a [`NotifyUser`] request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyUserAck {
    pub ok_cancel: bool,
}

impl Wire for NotifyUserAck {
    const LAYOUT: &'static [Field] = &[Field::bool("ok_cancel")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put_bool(self.ok_cancel);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.ok_cancel = r.bool();
    }
}

impl Message for NotifyUserAck {
    const TAG: u8 = DieMessageKind::NotifyUserAck as u8;
}

/// Stores a 32-bit value in the die's small persistent store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreValue {
    pub value: u32,
}

impl Wire for StoreValue {
    const LAYOUT: &'static [Field] = &[Field::u32("value")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.value);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.value = r.u32();
    }
}

impl Message for StoreValue {
    const TAG: u8 = DieMessageKind::StoreValue as u8;
}

/// Outcome of a [`StoreValue`] request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreValueAck {
    pub result: StoreValueResult,
    /// Index at which the value was written.
    pub index: u8,
}

impl Wire for StoreValueAck {
    const LAYOUT: &'static [Field] = &[Field::u8("result"), Field::u8("index")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.result as u8);
        w.put(self.index);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.result = StoreValueResult::from_u8(r.u8());
        self.index = r.u8();
    }
}

impl Message for StoreValueAck {
    const TAG: u8 = DieMessageKind::StoreValueAck as u8;
}

/// Configures the die type and colorway.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDesignAndColor {
    pub die_type: DieType,
    pub colorway: Colorway,
}

impl Wire for SetDesignAndColor {
    const LAYOUT: &'static [Field] = &[Field::u8("die_type"), Field::u8("colorway")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.die_type as u8);
        w.put(self.colorway as u8);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.die_type = DieType::from_u8(r.u8());
        self.colorway = Colorway::from_u8(r.u8());
    }
}

impl Message for SetDesignAndColor {
    const TAG: u8 = DieMessageKind::SetDesignAndColor as u8;
}

/// Renames the die.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetName {
    pub name: String,
}

impl Wire for SetName {
    // +1 for the NUL terminator.
    const LAYOUT: &'static [Field] = &[Field::string("name", (MAX_NAME_BYTE_SIZE + 1) as u16)];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put_str(&self.name);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.name = r.string();
    }
}

impl Message for SetName {
    const TAG: u8 = DieMessageKind::SetName as u8;
}

/// Changes the die's power state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PowerOperationMessage {
    pub operation: PowerOperation,
}

impl Wire for PowerOperationMessage {
    const LAYOUT: &'static [Field] = &[Field::u8("operation")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.operation as u8);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.operation = match r.u8() {
            0 => PowerOperation::TurnOff,
            1 => PowerOperation::Reset,
            _ => PowerOperation::Sleep,
        };
    }
}

impl Message for PowerOperationMessage {
    const TAG: u8 = DieMessageKind::PowerOperation as u8;
}

/// Plays one of the instant animations previously uploaded to RAM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayInstantAnimation {
    pub animation: u8,
    pub face_index: u8,
    pub loop_count: u8,
}

impl Default for PlayInstantAnimation {
    fn default() -> Self {
        Self {
            animation: 0,
            face_index: 0,
            loop_count: 1,
        }
    }
}

impl Wire for PlayInstantAnimation {
    const LAYOUT: &'static [Field] = &[
        Field::u8("animation"),
        Field::u8("face_index"),
        Field::u8("loop_count"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.animation);
        w.put(self.face_index);
        w.put(self.loop_count);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.animation = r.u8();
        self.face_index = r.u8();
        self.loop_count = r.u8();
    }
}

impl Message for PlayInstantAnimation {
    const TAG: u8 = DieMessageKind::PlayInstantAnimation as u8;
}

/// Internal temperature report, in hundredths of a degree Celsius.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Temperature {
    /// 0xFFFF when the die could not read the temperature.
    pub mcu_temperature_times_100: u16,
    pub battery_temperature_times_100: u16,
}

impl Wire for Temperature {
    const LAYOUT: &'static [Field] = &[
        Field::u16("mcu_temperature_times_100"),
        Field::u16("battery_temperature_times_100"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.mcu_temperature_times_100);
        w.put(self.battery_temperature_times_100);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.mcu_temperature_times_100 = r.u16();
        self.battery_temperature_times_100 = r.u16();
    }
}

impl Message for Temperature {
    const TAG: u8 = DieMessageKind::Temperature as u8;
}

/// Sets the battery controller charging policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetBatteryControllerMode {
    pub mode: BatteryControllerMode,
}

impl Wire for SetBatteryControllerMode {
    const LAYOUT: &'static [Field] = &[Field::u8("mode")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.mode as u8);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.mode = BatteryControllerMode::from_u8(r.u8());
    }
}

impl Message for SetBatteryControllerMode {
    const TAG: u8 = DieMessageKind::SetBatteryControllerMode as u8;
}

/// Lights LEDs to draw `current_ma` and discharge the battery; 0 resets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discharge {
    pub current_ma: u8,
}

impl Wire for Discharge {
    const LAYOUT: &'static [Field] = &[Field::u8("current_ma")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.current_ma);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.current_ma = r.u8();
    }
}

impl Message for Discharge {
    const TAG: u8 = DieMessageKind::Discharge as u8;
}

/// Blinks the die's identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlinkId {
    pub brightness: u8,
    pub loop_count: u8,
}

impl Default for BlinkId {
    fn default() -> Self {
        Self {
            brightness: 0,
            loop_count: 1,
        }
    }
}

impl Wire for BlinkId {
    const LAYOUT: &'static [Field] = &[Field::u8("brightness"), Field::u8("loop_count")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.brightness);
        w.put(self.loop_count);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.brightness = r.u8();
        self.loop_count = r.u8();
    }
}

impl Message for BlinkId {
    const TAG: u8 = DieMessageKind::BlinkId as u8;
}

/// Requests a transfer-rate test of `size` bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferTest {
    pub size: u16,
}

impl Wire for TransferTest {
    const LAYOUT: &'static [Field] = &[Field::u16("size").padded(1)];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.size);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.size = r.u16();
    }
}

impl Message for TransferTest {
    const TAG: u8 = DieMessageKind::TransferTest as u8;
}

/// Plays an animation from the profile stored on the die.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayProfileAnimation {
    pub animation_index: u8,
    /// Face to remap the animation onto.
    pub remap_to_face: u8,
    pub loop_count: u8,
}

impl Default for PlayProfileAnimation {
    fn default() -> Self {
        Self {
            animation_index: 0,
            remap_to_face: 0,
            loop_count: 1,
        }
    }
}

impl Wire for PlayProfileAnimation {
    const LAYOUT: &'static [Field] = &[
        Field::u8("animation_index"),
        Field::u8("remap_to_face"),
        Field::u8("loop_count"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.animation_index);
        w.put(self.remap_to_face);
        w.put(self.loop_count);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.animation_index = r.u8();
        self.remap_to_face = r.u8();
        self.loop_count = r.u8();
    }
}

impl Message for PlayProfileAnimation {
    const TAG: u8 = DieMessageKind::PlayAnimation as u8;
}

// ── Message sum type ──────────────────────────────────────────────────────────

/// A decoded die message: either a typed payload, or — for the many message
/// types that carry no payload — just the bare kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DieMessage {
    Bare(DieMessageKind),
    LegacyIAmADie(LegacyIAmADie),
    IAmADie(IAmADie),
    RollState(RollStateMessage),
    Telemetry(Telemetry),
    BulkSetup(BulkSetup),
    BulkData(BulkData),
    BulkDataAck(BulkDataAck),
    TransferAnimationSet(TransferAnimationSet),
    TransferAnimationSetAck(TransferAnimationSetAck),
    TransferTestAnimationSet(TransferTestAnimationSet),
    TransferTestAnimationSetAck(TransferTestAnimationSetAck),
    TransferInstantAnimationSet(TransferInstantAnimationSet),
    TransferInstantAnimationSetAck(TransferInstantAnimationSetAck),
    DebugLog(DebugLog),
    RemoteAction(RemoteAction),
    RequestTelemetry(RequestTelemetry),
    Blink(Blink),
    BatteryLevel(BatteryLevel),
    RequestRssi(RequestRssi),
    Rssi(Rssi),
    NotifyUser(NotifyUser),
    NotifyUserAck(NotifyUserAck),
    StoreValue(StoreValue),
    StoreValueAck(StoreValueAck),
    SetDesignAndColor(SetDesignAndColor),
    SetName(SetName),
    PowerOperation(PowerOperationMessage),
    PlayInstantAnimation(PlayInstantAnimation),
    Temperature(Temperature),
    SetBatteryControllerMode(SetBatteryControllerMode),
    Discharge(Discharge),
    BlinkId(BlinkId),
    TransferTest(TransferTest),
    PlayProfileAnimation(PlayProfileAnimation),
}

impl DieMessage {
    /// The message's type tag kind.
    pub fn kind(&self) -> DieMessageKind {
        match self {
            DieMessage::Bare(kind) => *kind,
            DieMessage::LegacyIAmADie(_) | DieMessage::IAmADie(_) => DieMessageKind::IAmADie,
            DieMessage::RollState(_) => DieMessageKind::RollState,
            DieMessage::Telemetry(_) => DieMessageKind::Telemetry,
            DieMessage::BulkSetup(_) => DieMessageKind::BulkSetup,
            DieMessage::BulkData(_) => DieMessageKind::BulkData,
            DieMessage::BulkDataAck(_) => DieMessageKind::BulkDataAck,
            DieMessage::TransferAnimationSet(_) => DieMessageKind::TransferAnimationSet,
            DieMessage::TransferAnimationSetAck(_) => DieMessageKind::TransferAnimationSetAck,
            DieMessage::TransferTestAnimationSet(_) => DieMessageKind::TransferTestAnimationSet,
            DieMessage::TransferTestAnimationSetAck(_) => {
                DieMessageKind::TransferTestAnimationSetAck
            }
            DieMessage::TransferInstantAnimationSet(_) => {
                DieMessageKind::TransferInstantAnimationSet
            }
            DieMessage::TransferInstantAnimationSetAck(_) => {
                DieMessageKind::TransferInstantAnimationSetAck
            }
            DieMessage::DebugLog(_) => DieMessageKind::DebugLog,
            DieMessage::RemoteAction(_) => DieMessageKind::RemoteAction,
            DieMessage::RequestTelemetry(_) => DieMessageKind::RequestTelemetry,
            DieMessage::Blink(_) => DieMessageKind::Blink,
            DieMessage::BatteryLevel(_) => DieMessageKind::BatteryLevel,
            DieMessage::RequestRssi(_) => DieMessageKind::RequestRssi,
            DieMessage::Rssi(_) => DieMessageKind::Rssi,
            DieMessage::NotifyUser(_) => DieMessageKind::NotifyUser,
            DieMessage::NotifyUserAck(_) => DieMessageKind::NotifyUserAck,
            DieMessage::StoreValue(_) => DieMessageKind::StoreValue,
            DieMessage::StoreValueAck(_) => DieMessageKind::StoreValueAck,
            DieMessage::SetDesignAndColor(_) => DieMessageKind::SetDesignAndColor,
            DieMessage::SetName(_) => DieMessageKind::SetName,
            DieMessage::PowerOperation(_) => DieMessageKind::PowerOperation,
            DieMessage::PlayInstantAnimation(_) => DieMessageKind::PlayInstantAnimation,
            DieMessage::Temperature(_) => DieMessageKind::Temperature,
            DieMessage::SetBatteryControllerMode(_) => DieMessageKind::SetBatteryControllerMode,
            DieMessage::Discharge(_) => DieMessageKind::Discharge,
            DieMessage::BlinkId(_) => DieMessageKind::BlinkId,
            DieMessage::TransferTest(_) => DieMessageKind::TransferTest,
            DieMessage::PlayProfileAnimation(_) => DieMessageKind::PlayAnimation,
        }
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Codec for the die message registry.
#[derive(Debug, Clone, Copy)]
pub struct DieCodec;

impl ProtocolCodec for DieCodec {
    type Msg = DieMessage;
    type Kind = DieMessageKind;

    fn encode(msg: &DieMessage) -> Vec<u8> {
        match msg {
            DieMessage::Bare(kind) => vec![*kind as u8],
            DieMessage::LegacyIAmADie(m) => serialize(m),
            DieMessage::IAmADie(m) => m.encode_chunks(),
            DieMessage::RollState(m) => serialize(m),
            DieMessage::Telemetry(m) => serialize(m),
            DieMessage::BulkSetup(m) => serialize(m),
            DieMessage::BulkData(m) => serialize(m),
            DieMessage::BulkDataAck(m) => serialize(m),
            DieMessage::TransferAnimationSet(m) => serialize(m),
            DieMessage::TransferAnimationSetAck(m) => serialize(m),
            DieMessage::TransferTestAnimationSet(m) => serialize(m),
            DieMessage::TransferTestAnimationSetAck(m) => serialize(m),
            DieMessage::TransferInstantAnimationSet(m) => serialize(m),
            DieMessage::TransferInstantAnimationSetAck(m) => serialize(m),
            DieMessage::DebugLog(m) => serialize(m),
            DieMessage::RemoteAction(m) => serialize(m),
            DieMessage::RequestTelemetry(m) => serialize(m),
            DieMessage::Blink(m) => serialize(m),
            DieMessage::BatteryLevel(m) => serialize(m),
            DieMessage::RequestRssi(m) => serialize(m),
            DieMessage::Rssi(m) => serialize(m),
            DieMessage::NotifyUser(m) => serialize(m),
            DieMessage::NotifyUserAck(m) => serialize(m),
            DieMessage::StoreValue(m) => serialize(m),
            DieMessage::StoreValueAck(m) => serialize(m),
            DieMessage::SetDesignAndColor(m) => serialize(m),
            DieMessage::SetName(m) => serialize(m),
            DieMessage::PowerOperation(m) => serialize(m),
            DieMessage::PlayInstantAnimation(m) => serialize(m),
            DieMessage::Temperature(m) => serialize(m),
            DieMessage::SetBatteryControllerMode(m) => serialize(m),
            DieMessage::Discharge(m) => serialize(m),
            DieMessage::BlinkId(m) => serialize(m),
            DieMessage::TransferTest(m) => serialize(m),
            DieMessage::PlayProfileAnimation(m) => serialize(m),
        }
    }

    fn decode(bytes: &[u8]) -> Result<DieMessage, DecodeError> {
        let Some(&tag) = bytes.first() else {
            return Err(DecodeError::Empty);
        };
        let kind = DieMessageKind::try_from(tag).map_err(|_| DecodeError::UnknownKind(tag))?;
        if bytes.len() == 1 {
            return Ok(DieMessage::Bare(kind));
        }
        match kind {
            // Legacy firmware sends a fixed 22-byte identification payload;
            // any other length is parsed as chunks.
            DieMessageKind::IAmADie => {
                if bytes.len() == LegacyIAmADie::WIRE_SIZE {
                    deserialize(bytes).map(DieMessage::LegacyIAmADie)
                } else {
                    Ok(DieMessage::IAmADie(IAmADie::decode_chunks(&bytes[1..])))
                }
            }
            DieMessageKind::RollState => deserialize(bytes).map(DieMessage::RollState),
            DieMessageKind::Telemetry => deserialize(bytes).map(DieMessage::Telemetry),
            DieMessageKind::BulkSetup => deserialize(bytes).map(DieMessage::BulkSetup),
            DieMessageKind::BulkData => deserialize(bytes).map(DieMessage::BulkData),
            DieMessageKind::BulkDataAck => deserialize(bytes).map(DieMessage::BulkDataAck),
            DieMessageKind::TransferAnimationSet => {
                deserialize(bytes).map(DieMessage::TransferAnimationSet)
            }
            DieMessageKind::TransferAnimationSetAck => {
                deserialize(bytes).map(DieMessage::TransferAnimationSetAck)
            }
            DieMessageKind::TransferTestAnimationSet => {
                deserialize(bytes).map(DieMessage::TransferTestAnimationSet)
            }
            DieMessageKind::TransferTestAnimationSetAck => {
                deserialize(bytes).map(DieMessage::TransferTestAnimationSetAck)
            }
            DieMessageKind::TransferInstantAnimationSet => {
                deserialize(bytes).map(DieMessage::TransferInstantAnimationSet)
            }
            DieMessageKind::TransferInstantAnimationSetAck => {
                deserialize(bytes).map(DieMessage::TransferInstantAnimationSetAck)
            }
            DieMessageKind::DebugLog => deserialize(bytes).map(DieMessage::DebugLog),
            DieMessageKind::RemoteAction => deserialize(bytes).map(DieMessage::RemoteAction),
            DieMessageKind::RequestTelemetry => {
                deserialize(bytes).map(DieMessage::RequestTelemetry)
            }
            DieMessageKind::Blink => deserialize(bytes).map(DieMessage::Blink),
            DieMessageKind::BatteryLevel => deserialize(bytes).map(DieMessage::BatteryLevel),
            DieMessageKind::RequestRssi => deserialize(bytes).map(DieMessage::RequestRssi),
            DieMessageKind::Rssi => deserialize(bytes).map(DieMessage::Rssi),
            DieMessageKind::NotifyUser => deserialize(bytes).map(DieMessage::NotifyUser),
            DieMessageKind::NotifyUserAck => deserialize(bytes).map(DieMessage::NotifyUserAck),
            DieMessageKind::StoreValue => deserialize(bytes).map(DieMessage::StoreValue),
            DieMessageKind::StoreValueAck => deserialize(bytes).map(DieMessage::StoreValueAck),
            DieMessageKind::SetDesignAndColor => {
                deserialize(bytes).map(DieMessage::SetDesignAndColor)
            }
            DieMessageKind::SetName => deserialize(bytes).map(DieMessage::SetName),
            DieMessageKind::PowerOperation => deserialize(bytes).map(DieMessage::PowerOperation),
            DieMessageKind::PlayInstantAnimation => {
                deserialize(bytes).map(DieMessage::PlayInstantAnimation)
            }
            DieMessageKind::Temperature => deserialize(bytes).map(DieMessage::Temperature),
            DieMessageKind::SetBatteryControllerMode => {
                deserialize(bytes).map(DieMessage::SetBatteryControllerMode)
            }
            DieMessageKind::Discharge => deserialize(bytes).map(DieMessage::Discharge),
            DieMessageKind::BlinkId => deserialize(bytes).map(DieMessage::BlinkId),
            DieMessageKind::TransferTest => deserialize(bytes).map(DieMessage::TransferTest),
            DieMessageKind::PlayAnimation => {
                deserialize(bytes).map(DieMessage::PlayProfileAnimation)
            }
            other => {
                tracing::warn!(
                    kind = ?other,
                    len = bytes.len(),
                    "payload bytes on a message kind with no body, ignoring them"
                );
                Ok(DieMessage::Bare(other))
            }
        }
    }

    fn kind_of(msg: &DieMessage) -> DieMessageKind {
        msg.kind()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &DieMessage) -> DieMessage {
        DieCodec::decode(&DieCodec::encode(msg)).expect("decode failed")
    }

    #[test]
    fn test_legacy_identification_is_22_bytes() {
        assert_eq!(LegacyIAmADie::WIRE_SIZE, 22);
        let bytes = serialize(&LegacyIAmADie::default());
        assert_eq!(bytes.len(), 22);
    }

    #[test]
    fn test_legacy_identification_round_trip() {
        let msg = DieMessage::LegacyIAmADie(LegacyIAmADie {
            led_count: 20,
            colorway: Colorway::MidnightGalaxy,
            die_type: DieType::D20,
            data_set_hash: 0xDEAD_BEEF,
            device_id: 0x1234_5678,
            available_flash_size: 8000,
            build_timestamp: 1_650_000_000,
            roll_state: RollState::OnFace,
            current_face_index: 19,
            battery_level_percent: 87,
            battery_state: BatteryState::Done,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_chunked_identification_round_trip() {
        let msg = DieMessage::IAmADie(IAmADie {
            version_info: VersionInfoChunk {
                firmware_version: 0x0102,
                build_timestamp: 1_700_000_000,
                settings_version: 0x0100,
                compat_standard_api_version: 0x0100,
                compat_extended_api_version: 0x0100,
                compat_management_api_version: 0x0100,
                ..VersionInfoChunk::default()
            },
            die_info: DieInfoChunk {
                device_id: 0xCAFE_F00D,
                die_type: DieType::D12,
                led_count: 12,
                colorway: Colorway::AuroraSky,
                ..DieInfoChunk::default()
            },
            custom_design_name: NameChunk::new(""),
            die_name: NameChunk::new("Fortuna"),
            settings_info: DieSettingsInfoChunk {
                profile_data_hash: 0x0BAD_C0DE,
                available_flash: 4096,
                total_usable_flash: 8192,
                ..DieSettingsInfoChunk::default()
            },
            status_info: DieStatusInfoChunk {
                battery_level_percent: 66,
                battery_state: BatteryState::Charging,
                roll_state: RollState::OnFace,
                current_face_index: 11,
                ..DieStatusInfoChunk::default()
            },
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_identification_dispatch_is_length_based() {
        // A chunked payload that happens to decode: tag + chunks.
        let chunked = DieMessage::IAmADie(IAmADie::default());
        let bytes = DieCodec::encode(&chunked);
        assert_ne!(bytes.len(), LegacyIAmADie::WIRE_SIZE);
        assert!(matches!(
            DieCodec::decode(&bytes).unwrap(),
            DieMessage::IAmADie(_)
        ));

        let legacy = DieMessage::LegacyIAmADie(LegacyIAmADie::default());
        let bytes = DieCodec::encode(&legacy);
        assert_eq!(bytes.len(), LegacyIAmADie::WIRE_SIZE);
        assert!(matches!(
            DieCodec::decode(&bytes).unwrap(),
            DieMessage::LegacyIAmADie(_)
        ));
    }

    #[test]
    fn test_single_byte_decodes_to_bare_kind() {
        let msg = DieCodec::decode(&[DieMessageKind::WhoAreYou as u8]).unwrap();
        assert_eq!(msg, DieMessage::Bare(DieMessageKind::WhoAreYou));
    }

    #[test]
    fn test_bare_message_encodes_to_single_tag_byte() {
        let bytes = DieCodec::encode(&DieMessage::Bare(DieMessageKind::StopAllAnimations));
        assert_eq!(bytes, vec![DieMessageKind::StopAllAnimations as u8]);
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert_eq!(DieCodec::decode(&[0xF0]), Err(DecodeError::UnknownKind(0xF0)));
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        assert_eq!(DieCodec::decode(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn test_payload_on_bare_kind_is_tolerated() {
        let msg = DieCodec::decode(&[DieMessageKind::Calibrate as u8, 1, 2, 3]).unwrap();
        assert_eq!(msg, DieMessage::Bare(DieMessageKind::Calibrate));
    }

    #[test]
    fn test_type_tag_invariant_for_registered_payloads() {
        fn assert_tag_guard<T: Message + std::fmt::Debug>() {
            let mut bytes = serialize(&T::default());
            bytes[0] = bytes[0].wrapping_add(1);
            let result: Result<T, _> = deserialize(&bytes);
            assert!(
                matches!(result, Err(DecodeError::TypeMismatch { .. })),
                "tag guard failed for {}",
                std::any::type_name::<T>()
            );
        }

        assert_tag_guard::<LegacyIAmADie>();
        assert_tag_guard::<RollStateMessage>();
        assert_tag_guard::<Telemetry>();
        assert_tag_guard::<BulkSetup>();
        assert_tag_guard::<BulkData>();
        assert_tag_guard::<BulkDataAck>();
        assert_tag_guard::<TransferAnimationSet>();
        assert_tag_guard::<TransferAnimationSetAck>();
        assert_tag_guard::<TransferTestAnimationSet>();
        assert_tag_guard::<TransferTestAnimationSetAck>();
        assert_tag_guard::<TransferInstantAnimationSet>();
        assert_tag_guard::<TransferInstantAnimationSetAck>();
        assert_tag_guard::<DebugLog>();
        assert_tag_guard::<RemoteAction>();
        assert_tag_guard::<RequestTelemetry>();
        assert_tag_guard::<Blink>();
        assert_tag_guard::<BatteryLevel>();
        assert_tag_guard::<RequestRssi>();
        assert_tag_guard::<Rssi>();
        assert_tag_guard::<NotifyUser>();
        assert_tag_guard::<NotifyUserAck>();
        assert_tag_guard::<StoreValue>();
        assert_tag_guard::<StoreValueAck>();
        assert_tag_guard::<SetDesignAndColor>();
        assert_tag_guard::<SetName>();
        assert_tag_guard::<PowerOperationMessage>();
        assert_tag_guard::<PlayInstantAnimation>();
        assert_tag_guard::<Temperature>();
        assert_tag_guard::<SetBatteryControllerMode>();
        assert_tag_guard::<Discharge>();
        assert_tag_guard::<BlinkId>();
        assert_tag_guard::<TransferTest>();
        assert_tag_guard::<PlayProfileAnimation>();
    }

    #[test]
    fn test_telemetry_round_trip_with_negative_values() {
        let msg = DieMessage::Telemetry(Telemetry {
            acc_x_times_1000: -1000,
            acc_y_times_1000: i16::MIN,
            acc_z_times_1000: i16::MAX,
            face_confidence_times_1000: -250_000,
            time_ms: u32::MAX,
            roll_state: RollState::Rolling,
            face_index: 5,
            battery_level_percent: 42,
            battery_state: BatteryState::Low,
            rssi: -70,
            mcu_temperature_times_100: 0xFFFF,
            internal_charge_state: true,
            ..Telemetry::default()
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_bulk_data_pads_to_max_message_size() {
        let msg = BulkData {
            size: 3,
            offset: 200,
            data: vec![1, 2, 3],
        };
        let bytes = serialize(&msg);
        assert_eq!(bytes.len(), BulkData::WIRE_SIZE);
        let decoded: BulkData = deserialize(&bytes).unwrap();
        assert_eq!(decoded.size, 3);
        assert_eq!(decoded.offset, 200);
        assert_eq!(&decoded.data[..3], &[1, 2, 3]);
        assert!(decoded.data[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_rssi_round_trip_keeps_sign() {
        let msg = DieMessage::Rssi(Rssi { value: -42 });
        assert_eq!(round_trip(&msg), msg);
        let msg = DieMessage::Rssi(Rssi { value: i8::MIN });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_set_name_round_trip() {
        let msg = DieMessage::SetName(SetName {
            name: "Misfortune".to_string(),
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_blink_defaults_light_all_faces_once() {
        let blink = Blink::default();
        assert_eq!(blink.face_mask, FACE_MASK_ALL);
        assert_eq!(blink.loop_count, 1);
    }

    #[test]
    fn test_kind_matches_leading_byte_for_all_variants() {
        let messages = [
            DieMessage::RollState(RollStateMessage::default()),
            DieMessage::BulkSetup(BulkSetup::default()),
            DieMessage::Blink(Blink::default()),
            DieMessage::Bare(DieMessageKind::WhoAreYou),
            DieMessage::PlayProfileAnimation(PlayProfileAnimation::default()),
        ];
        for msg in &messages {
            let bytes = DieCodec::encode(msg);
            assert_eq!(bytes[0], msg.kind() as u8);
        }
    }
}

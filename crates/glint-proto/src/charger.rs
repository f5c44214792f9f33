//! Message registry and codec for Glint charging cases.
//!
//! The numbering is independent from the die registry and has to match up
//! with the charger firmware.

use crate::chunk::{write_chunk, ChunkReader};
use crate::codec::ProtocolCodec;
use crate::constants::{FACE_MASK_ALL, MAX_MESSAGE_SIZE, MAX_NAME_BYTE_SIZE};
use crate::ident::{DeviceInfoChunk, NameChunk, SettingsInfoChunk, StatusInfoChunk, VersionInfoChunk};
use crate::schema::{deserialize, serialize, DecodeError, Field, FieldReader, FieldWriter, Message, Wire};
use crate::values::{BatteryState, PowerOperation, SlotState, StoreValueResult, TelemetryRequestMode};

// ── Message kinds ─────────────────────────────────────────────────────────────

/// All charger message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChargerMessageKind {
    None = 0,
    WhoAreYou = 1,
    IAmALcc = 2,
    BulkSetup = 3,
    BulkSetupAck = 4,
    BulkData = 5,
    BulkDataAck = 6,
    TransferSettings = 7,
    TransferSettingsAck = 8,
    TransferSettingsFinished = 9,
    DebugLog = 10,
    RequestSettings = 11,
    Blink = 12,
    BlinkAck = 13,
    RequestBatteryLevel = 14,
    BatteryLevel = 15,
    RequestRssi = 16,
    Rssi = 17,
    NotifyUser = 18,
    NotifyUserAck = 19,
    StoreValue = 20,
    StoreValueAck = 21,
    ProgramDefaultParameters = 22,
    ProgramDefaultParametersFinished = 23,
    SetName = 24,
    SetNameAck = 25,
    PowerOperation = 26,
    ExitValidation = 27,
    RequestTemperature = 28,
    Temperature = 29,
    RequestSlotsStatuses = 30,
    SlotsStatuses = 31,
    // Factory-test messages.
    TestBulkSend = 32,
    TestBulkReceive = 33,
    AttractMode = 34,
    PrintA2dReadings = 35,
    PrintAnimationControllerState = 36,
}

impl TryFrom<u8> for ChargerMessageKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        use ChargerMessageKind::*;
        Ok(match value {
            0 => None,
            1 => WhoAreYou,
            2 => IAmALcc,
            3 => BulkSetup,
            4 => BulkSetupAck,
            5 => BulkData,
            6 => BulkDataAck,
            7 => TransferSettings,
            8 => TransferSettingsAck,
            9 => TransferSettingsFinished,
            10 => DebugLog,
            11 => RequestSettings,
            12 => Blink,
            13 => BlinkAck,
            14 => RequestBatteryLevel,
            15 => BatteryLevel,
            16 => RequestRssi,
            17 => Rssi,
            18 => NotifyUser,
            19 => NotifyUserAck,
            20 => StoreValue,
            21 => StoreValueAck,
            22 => ProgramDefaultParameters,
            23 => ProgramDefaultParametersFinished,
            24 => SetName,
            25 => SetNameAck,
            26 => PowerOperation,
            27 => ExitValidation,
            28 => RequestTemperature,
            29 => Temperature,
            30 => RequestSlotsStatuses,
            31 => SlotsStatuses,
            32 => TestBulkSend,
            33 => TestBulkReceive,
            34 => AttractMode,
            35 => PrintA2dReadings,
            36 => PrintAnimationControllerState,
            _ => return Err(()),
        })
    }
}

// ── Identification payloads ───────────────────────────────────────────────────

/// Identification response of a charger running legacy firmware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyIAmALcc {
    pub led_count: u8,
    pub device_id: u32,
    pub available_flash_size: u16,
    pub build_timestamp: u32,
    pub battery_level_percent: u8,
    pub battery_state: BatteryState,
}

impl Wire for LegacyIAmALcc {
    const LAYOUT: &'static [Field] = &[
        Field::u8("led_count").padded(6),
        Field::u32("device_id"),
        Field::u16("available_flash_size"),
        Field::u32("build_timestamp"),
        Field::u8("battery_level_percent"),
        Field::u8("battery_state"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.led_count);
        w.put(self.device_id);
        w.put(self.available_flash_size);
        w.put(self.build_timestamp);
        w.put(self.battery_level_percent);
        w.put(self.battery_state as u8);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.led_count = r.u8();
        self.device_id = r.u32();
        self.available_flash_size = r.u16();
        self.build_timestamp = r.u32();
        self.battery_level_percent = r.u8();
        self.battery_state = BatteryState::from_u8(r.u8());
    }
}

impl Message for LegacyIAmALcc {
    const TAG: u8 = ChargerMessageKind::IAmALcc as u8;
}

/// Identification response of a charger running current firmware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IAmALcc {
    pub version_info: VersionInfoChunk,
    pub charger_info: DeviceInfoChunk,
    pub name: NameChunk,
    pub settings_info: SettingsInfoChunk,
    pub status_info: StatusInfoChunk,
}

impl IAmALcc {
    pub const TAG: u8 = ChargerMessageKind::IAmALcc as u8;

    pub fn decode_chunks(payload: &[u8]) -> Self {
        let mut r = ChunkReader::new(payload);
        let msg = Self {
            version_info: r.read_chunk("version info"),
            charger_info: r.read_chunk("charger info"),
            name: r.read_chunk("name"),
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
        write_chunk(&mut buf, &self.charger_info);
        write_chunk(&mut buf, &self.name);
        write_chunk(&mut buf, &self.settings_info);
        write_chunk(&mut buf, &self.status_info);
        buf
    }
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
    const TAG: u8 = ChargerMessageKind::BulkSetup as u8;
}

/// One chunk of a bulk transfer.
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
    const TAG: u8 = ChargerMessageKind::BulkData as u8;
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
    const TAG: u8 = ChargerMessageKind::BulkDataAck as u8;
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
    const TAG: u8 = ChargerMessageKind::DebugLog as u8;
}

/// Makes the charger blink its LEDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blink {
    pub count: u8,
    pub duration: u16,
    pub color: u32,
    pub face_mask: u32,
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
    const TAG: u8 = ChargerMessageKind::Blink as u8;
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
    const TAG: u8 = ChargerMessageKind::BatteryLevel as u8;
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
    const TAG: u8 = ChargerMessageKind::RequestRssi as u8;
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
    const TAG: u8 = ChargerMessageKind::Rssi as u8;
}

/// Asks the application to show a message to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyUser {
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
    const TAG: u8 = ChargerMessageKind::NotifyUser as u8;
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
    const TAG: u8 = ChargerMessageKind::NotifyUserAck as u8;
}

/// Stores a 32-bit value in the charger's persistent store.
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
    const TAG: u8 = ChargerMessageKind::StoreValue as u8;
}

/// Outcome of a [`StoreValue`] request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreValueAck {
    pub result: StoreValueResult,
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
    const TAG: u8 = ChargerMessageKind::StoreValueAck as u8;
}

/// Renames the charger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetName {
    pub name: String,
}

impl Wire for SetName {
    const LAYOUT: &'static [Field] = &[Field::string("name", (MAX_NAME_BYTE_SIZE + 1) as u16)];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put_str(&self.name);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.name = r.string();
    }
}

impl Message for SetName {
    const TAG: u8 = ChargerMessageKind::SetName as u8;
}

/// Changes the charger's power state.
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
    const TAG: u8 = ChargerMessageKind::PowerOperation as u8;
}

/// Internal temperature report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Temperature {
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
    const TAG: u8 = ChargerMessageKind::Temperature as u8;
}

/// Status of one charging coil slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStatus {
    pub raw_current: i16,
    pub current: i16,
    pub state: SlotState,
    pub die_present: bool,
    pub skipped: bool,
    pub charged_once: bool,
}

/// Status report for all eight charging slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotsStatuses {
    pub slots: [SlotStatus; 8],
}

impl Wire for SlotsStatuses {
    const LAYOUT: &'static [Field] = &[
        // One group of six fields per slot, in slot order.
        Field::i16("raw_current"),
        Field::i16("current"),
        Field::u8("state"),
        Field::bool("die_present"),
        Field::bool("skipped"),
        Field::bool("charged_once"),
        Field::i16("raw_current"),
        Field::i16("current"),
        Field::u8("state"),
        Field::bool("die_present"),
        Field::bool("skipped"),
        Field::bool("charged_once"),
        Field::i16("raw_current"),
        Field::i16("current"),
        Field::u8("state"),
        Field::bool("die_present"),
        Field::bool("skipped"),
        Field::bool("charged_once"),
        Field::i16("raw_current"),
        Field::i16("current"),
        Field::u8("state"),
        Field::bool("die_present"),
        Field::bool("skipped"),
        Field::bool("charged_once"),
        Field::i16("raw_current"),
        Field::i16("current"),
        Field::u8("state"),
        Field::bool("die_present"),
        Field::bool("skipped"),
        Field::bool("charged_once"),
        Field::i16("raw_current"),
        Field::i16("current"),
        Field::u8("state"),
        Field::bool("die_present"),
        Field::bool("skipped"),
        Field::bool("charged_once"),
        Field::i16("raw_current"),
        Field::i16("current"),
        Field::u8("state"),
        Field::bool("die_present"),
        Field::bool("skipped"),
        Field::bool("charged_once"),
        Field::i16("raw_current"),
        Field::i16("current"),
        Field::u8("state"),
        Field::bool("die_present"),
        Field::bool("skipped"),
        Field::bool("charged_once"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        for slot in &self.slots {
            w.put(slot.raw_current);
            w.put(slot.current);
            w.put(slot.state as u8);
            w.put_bool(slot.die_present);
            w.put_bool(slot.skipped);
            w.put_bool(slot.charged_once);
        }
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        for slot in &mut self.slots {
            slot.raw_current = r.i16();
            slot.current = r.i16();
            slot.state = SlotState::from_u8(r.u8());
            slot.die_present = r.bool();
            slot.skipped = r.bool();
            slot.charged_once = r.bool();
        }
    }
}

impl Message for SlotsStatuses {
    const TAG: u8 = ChargerMessageKind::SlotsStatuses as u8;
}

// ── Message sum type ──────────────────────────────────────────────────────────

/// A decoded charger message.
#[derive(Debug, Clone, PartialEq)]
pub enum ChargerMessage {
    Bare(ChargerMessageKind),
    LegacyIAmALcc(LegacyIAmALcc),
    IAmALcc(IAmALcc),
    BulkSetup(BulkSetup),
    BulkData(BulkData),
    BulkDataAck(BulkDataAck),
    DebugLog(DebugLog),
    Blink(Blink),
    BatteryLevel(BatteryLevel),
    RequestRssi(RequestRssi),
    Rssi(Rssi),
    NotifyUser(NotifyUser),
    NotifyUserAck(NotifyUserAck),
    StoreValue(StoreValue),
    StoreValueAck(StoreValueAck),
    SetName(SetName),
    PowerOperation(PowerOperationMessage),
    Temperature(Temperature),
    SlotsStatuses(SlotsStatuses),
}

impl ChargerMessage {
    pub fn kind(&self) -> ChargerMessageKind {
        match self {
            ChargerMessage::Bare(kind) => *kind,
            ChargerMessage::LegacyIAmALcc(_) | ChargerMessage::IAmALcc(_) => {
                ChargerMessageKind::IAmALcc
            }
            ChargerMessage::BulkSetup(_) => ChargerMessageKind::BulkSetup,
            ChargerMessage::BulkData(_) => ChargerMessageKind::BulkData,
            ChargerMessage::BulkDataAck(_) => ChargerMessageKind::BulkDataAck,
            ChargerMessage::DebugLog(_) => ChargerMessageKind::DebugLog,
            ChargerMessage::Blink(_) => ChargerMessageKind::Blink,
            ChargerMessage::BatteryLevel(_) => ChargerMessageKind::BatteryLevel,
            ChargerMessage::RequestRssi(_) => ChargerMessageKind::RequestRssi,
            ChargerMessage::Rssi(_) => ChargerMessageKind::Rssi,
            ChargerMessage::NotifyUser(_) => ChargerMessageKind::NotifyUser,
            ChargerMessage::NotifyUserAck(_) => ChargerMessageKind::NotifyUserAck,
            ChargerMessage::StoreValue(_) => ChargerMessageKind::StoreValue,
            ChargerMessage::StoreValueAck(_) => ChargerMessageKind::StoreValueAck,
            ChargerMessage::SetName(_) => ChargerMessageKind::SetName,
            ChargerMessage::PowerOperation(_) => ChargerMessageKind::PowerOperation,
            ChargerMessage::Temperature(_) => ChargerMessageKind::Temperature,
            ChargerMessage::SlotsStatuses(_) => ChargerMessageKind::SlotsStatuses,
        }
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Codec for the charger message registry.
#[derive(Debug, Clone, Copy)]
pub struct ChargerCodec;

impl ProtocolCodec for ChargerCodec {
    type Msg = ChargerMessage;
    type Kind = ChargerMessageKind;

    fn encode(msg: &ChargerMessage) -> Vec<u8> {
        match msg {
            ChargerMessage::Bare(kind) => vec![*kind as u8],
            ChargerMessage::LegacyIAmALcc(m) => serialize(m),
            ChargerMessage::IAmALcc(m) => m.encode_chunks(),
            ChargerMessage::BulkSetup(m) => serialize(m),
            ChargerMessage::BulkData(m) => serialize(m),
            ChargerMessage::BulkDataAck(m) => serialize(m),
            ChargerMessage::DebugLog(m) => serialize(m),
            ChargerMessage::Blink(m) => serialize(m),
            ChargerMessage::BatteryLevel(m) => serialize(m),
            ChargerMessage::RequestRssi(m) => serialize(m),
            ChargerMessage::Rssi(m) => serialize(m),
            ChargerMessage::NotifyUser(m) => serialize(m),
            ChargerMessage::NotifyUserAck(m) => serialize(m),
            ChargerMessage::StoreValue(m) => serialize(m),
            ChargerMessage::StoreValueAck(m) => serialize(m),
            ChargerMessage::SetName(m) => serialize(m),
            ChargerMessage::PowerOperation(m) => serialize(m),
            ChargerMessage::Temperature(m) => serialize(m),
            ChargerMessage::SlotsStatuses(m) => serialize(m),
        }
    }

    fn decode(bytes: &[u8]) -> Result<ChargerMessage, DecodeError> {
        let Some(&tag) = bytes.first() else {
            return Err(DecodeError::Empty);
        };
        let kind = ChargerMessageKind::try_from(tag).map_err(|_| DecodeError::UnknownKind(tag))?;
        if bytes.len() == 1 {
            return Ok(ChargerMessage::Bare(kind));
        }
        match kind {
            // Legacy firmware sends a fixed 20-byte identification payload;
            // any other length is parsed as chunks.
            ChargerMessageKind::IAmALcc => {
                if bytes.len() == LegacyIAmALcc::WIRE_SIZE {
                    deserialize(bytes).map(ChargerMessage::LegacyIAmALcc)
                } else {
                    Ok(ChargerMessage::IAmALcc(IAmALcc::decode_chunks(&bytes[1..])))
                }
            }
            ChargerMessageKind::BulkSetup => deserialize(bytes).map(ChargerMessage::BulkSetup),
            ChargerMessageKind::BulkData => deserialize(bytes).map(ChargerMessage::BulkData),
            ChargerMessageKind::BulkDataAck => deserialize(bytes).map(ChargerMessage::BulkDataAck),
            ChargerMessageKind::DebugLog => deserialize(bytes).map(ChargerMessage::DebugLog),
            ChargerMessageKind::Blink => deserialize(bytes).map(ChargerMessage::Blink),
            ChargerMessageKind::BatteryLevel => {
                deserialize(bytes).map(ChargerMessage::BatteryLevel)
            }
            ChargerMessageKind::RequestRssi => deserialize(bytes).map(ChargerMessage::RequestRssi),
            ChargerMessageKind::Rssi => deserialize(bytes).map(ChargerMessage::Rssi),
            ChargerMessageKind::NotifyUser => deserialize(bytes).map(ChargerMessage::NotifyUser),
            ChargerMessageKind::NotifyUserAck => {
                deserialize(bytes).map(ChargerMessage::NotifyUserAck)
            }
            ChargerMessageKind::StoreValue => deserialize(bytes).map(ChargerMessage::StoreValue),
            ChargerMessageKind::StoreValueAck => {
                deserialize(bytes).map(ChargerMessage::StoreValueAck)
            }
            ChargerMessageKind::SetName => deserialize(bytes).map(ChargerMessage::SetName),
            ChargerMessageKind::PowerOperation => {
                deserialize(bytes).map(ChargerMessage::PowerOperation)
            }
            ChargerMessageKind::Temperature => deserialize(bytes).map(ChargerMessage::Temperature),
            ChargerMessageKind::SlotsStatuses => {
                deserialize(bytes).map(ChargerMessage::SlotsStatuses)
            }
            other => {
                tracing::warn!(
                    kind = ?other,
                    len = bytes.len(),
                    "payload bytes on a message kind with no body, ignoring them"
                );
                Ok(ChargerMessage::Bare(other))
            }
        }
    }

    fn kind_of(msg: &ChargerMessage) -> ChargerMessageKind {
        msg.kind()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &ChargerMessage) -> ChargerMessage {
        ChargerCodec::decode(&ChargerCodec::encode(msg)).expect("decode failed")
    }

    #[test]
    fn test_legacy_identification_is_20_bytes() {
        assert_eq!(LegacyIAmALcc::WIRE_SIZE, 20);
    }

    #[test]
    fn test_legacy_identification_round_trip() {
        let msg = ChargerMessage::LegacyIAmALcc(LegacyIAmALcc {
            led_count: 8,
            device_id: 0xAA55_AA55,
            available_flash_size: 1024,
            build_timestamp: 1_600_000_000,
            battery_level_percent: 50,
            battery_state: BatteryState::Charging,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_chunked_identification_round_trip() {
        let msg = ChargerMessage::IAmALcc(IAmALcc {
            charger_info: DeviceInfoChunk {
                device_id: 0x0102_0304,
                led_count: 8,
                ..DeviceInfoChunk::default()
            },
            name: NameChunk::new("Dock"),
            ..IAmALcc::default()
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_slots_statuses_round_trip() {
        let mut slots = [SlotStatus::default(); 8];
        slots[0] = SlotStatus {
            raw_current: -120,
            current: 310,
            state: SlotState::Charging,
            die_present: true,
            skipped: false,
            charged_once: true,
        };
        slots[7].state = SlotState::Fod;
        let msg = ChargerMessage::SlotsStatuses(SlotsStatuses { slots });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_slots_statuses_wire_size() {
        // Tag byte plus eight 8-byte slot groups.
        assert_eq!(SlotsStatuses::WIRE_SIZE, 1 + 8 * 8);
    }

    #[test]
    fn test_bare_kind_round_trip() {
        let msg = ChargerMessage::Bare(ChargerMessageKind::RequestSlotsStatuses);
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert_eq!(
            ChargerCodec::decode(&[0xC8]),
            Err(DecodeError::UnknownKind(0xC8))
        );
    }
}

//! Message registry and codec for Glint multi-purpose controllers.

use crate::chunk::{write_chunk, ChunkReader};
use crate::codec::ProtocolCodec;
use crate::constants::{FACE_MASK_ALL, MAX_MESSAGE_SIZE, MAX_NAME_BYTE_SIZE};
use crate::ident::{DeviceInfoChunk, NameChunk, SettingsInfoChunk, StatusInfoChunk, VersionInfoChunk};
use crate::schema::{deserialize, serialize, DecodeError, Field, FieldReader, FieldWriter, Message, Wire};
use crate::values::TelemetryRequestMode;

// ── Message kinds ─────────────────────────────────────────────────────────────

/// All controller message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MpcMessageKind {
    None = 0,
    WhoAreYou = 1,
    IAmAMpc = 2,
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
    PlayAnimation = 14,
    StopAnimation = 15,
    RequestRssi = 16,
    Rssi = 17,
    NotifyUser = 18,
    NotifyUserAck = 19,
    ProgramDefaultParameters = 20,
    ProgramDefaultParametersFinished = 21,
    SetName = 22,
    SetNameAck = 23,
    RequestTemperature = 24,
    Temperature = 25,
    SynchronizeTime = 26,
}

impl TryFrom<u8> for MpcMessageKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        use MpcMessageKind::*;
        Ok(match value {
            0 => None,
            1 => WhoAreYou,
            2 => IAmAMpc,
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
            14 => PlayAnimation,
            15 => StopAnimation,
            16 => RequestRssi,
            17 => Rssi,
            18 => NotifyUser,
            19 => NotifyUserAck,
            20 => ProgramDefaultParameters,
            21 => ProgramDefaultParametersFinished,
            22 => SetName,
            23 => SetNameAck,
            24 => RequestTemperature,
            25 => Temperature,
            26 => SynchronizeTime,
            _ => return Err(()),
        })
    }
}

// ── Identification payloads ───────────────────────────────────────────────────

/// Identification response of a controller running legacy firmware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyIAmAMpc {
    pub led_count: u8,
    pub device_id: u32,
    pub available_flash_size: u16,
    pub build_timestamp: u32,
}

impl Wire for LegacyIAmAMpc {
    const LAYOUT: &'static [Field] = &[
        Field::u8("led_count").padded(6),
        Field::u32("device_id"),
        Field::u16("available_flash_size"),
        Field::u32("build_timestamp"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.led_count);
        w.put(self.device_id);
        w.put(self.available_flash_size);
        w.put(self.build_timestamp);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.led_count = r.u8();
        self.device_id = r.u32();
        self.available_flash_size = r.u16();
        self.build_timestamp = r.u32();
    }
}

impl Message for LegacyIAmAMpc {
    const TAG: u8 = MpcMessageKind::IAmAMpc as u8;
}

/// Identification response of a controller running current firmware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IAmAMpc {
    pub version_info: VersionInfoChunk,
    pub controller_info: DeviceInfoChunk,
    pub name: NameChunk,
    pub settings_info: SettingsInfoChunk,
    pub status_info: StatusInfoChunk,
}

impl IAmAMpc {
    pub const TAG: u8 = MpcMessageKind::IAmAMpc as u8;

    pub fn decode_chunks(payload: &[u8]) -> Self {
        let mut r = ChunkReader::new(payload);
        let msg = Self {
            version_info: r.read_chunk("version info"),
            controller_info: r.read_chunk("controller info"),
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
        write_chunk(&mut buf, &self.controller_info);
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
    const TAG: u8 = MpcMessageKind::BulkSetup as u8;
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
    const TAG: u8 = MpcMessageKind::BulkData as u8;
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
    const TAG: u8 = MpcMessageKind::BulkDataAck as u8;
}

// ── Control payloads ──────────────────────────────────────────────────────────

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
    const TAG: u8 = MpcMessageKind::DebugLog as u8;
}

/// Makes the controller blink its LEDs.
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
    const TAG: u8 = MpcMessageKind::Blink as u8;
}

/// Plays the animation at the given index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayAnimation {
    pub animation: u8,
}

impl Wire for PlayAnimation {
    const LAYOUT: &'static [Field] = &[Field::u8("animation")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.animation);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.animation = r.u8();
    }
}

impl Message for PlayAnimation {
    const TAG: u8 = MpcMessageKind::PlayAnimation as u8;
}

/// Stops the animation at the given index, fading out over `fade_out_time`
/// milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopAnimation {
    pub animation: u8,
    pub fade_out_time: u16,
}

impl Wire for StopAnimation {
    const LAYOUT: &'static [Field] = &[Field::u8("animation"), Field::u16("fade_out_time")];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.animation);
        w.put(self.fade_out_time);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.animation = r.u8();
        self.fade_out_time = r.u16();
    }
}

impl Message for StopAnimation {
    const TAG: u8 = MpcMessageKind::StopAnimation as u8;
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
    const TAG: u8 = MpcMessageKind::RequestRssi as u8;
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
    const TAG: u8 = MpcMessageKind::Rssi as u8;
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
    const TAG: u8 = MpcMessageKind::NotifyUser as u8;
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
    const TAG: u8 = MpcMessageKind::NotifyUserAck as u8;
}

/// Renames the controller.
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
    const TAG: u8 = MpcMessageKind::SetName as u8;
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
    const TAG: u8 = MpcMessageKind::Temperature as u8;
}

/// Schedules a firmware clock synchronization point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynchronizeTime {
    pub in_this_many_ms: u16,
    pub it_will_be_this_many_ms: u32,
}

impl Wire for SynchronizeTime {
    const LAYOUT: &'static [Field] = &[
        Field::u16("in_this_many_ms"),
        Field::u32("it_will_be_this_many_ms"),
    ];

    fn write_fields(&self, w: &mut FieldWriter<'_>) {
        w.put(self.in_this_many_ms);
        w.put(self.it_will_be_this_many_ms);
    }

    fn read_fields(&mut self, r: &mut FieldReader<'_>) {
        self.in_this_many_ms = r.u16();
        self.it_will_be_this_many_ms = r.u32();
    }
}

impl Message for SynchronizeTime {
    const TAG: u8 = MpcMessageKind::SynchronizeTime as u8;
}

// ── Message sum type ──────────────────────────────────────────────────────────

/// A decoded controller message.
#[derive(Debug, Clone, PartialEq)]
pub enum MpcMessage {
    Bare(MpcMessageKind),
    LegacyIAmAMpc(LegacyIAmAMpc),
    IAmAMpc(IAmAMpc),
    BulkSetup(BulkSetup),
    BulkData(BulkData),
    BulkDataAck(BulkDataAck),
    DebugLog(DebugLog),
    Blink(Blink),
    PlayAnimation(PlayAnimation),
    StopAnimation(StopAnimation),
    RequestRssi(RequestRssi),
    Rssi(Rssi),
    NotifyUser(NotifyUser),
    NotifyUserAck(NotifyUserAck),
    SetName(SetName),
    Temperature(Temperature),
    SynchronizeTime(SynchronizeTime),
}

impl MpcMessage {
    pub fn kind(&self) -> MpcMessageKind {
        match self {
            MpcMessage::Bare(kind) => *kind,
            MpcMessage::LegacyIAmAMpc(_) | MpcMessage::IAmAMpc(_) => MpcMessageKind::IAmAMpc,
            MpcMessage::BulkSetup(_) => MpcMessageKind::BulkSetup,
            MpcMessage::BulkData(_) => MpcMessageKind::BulkData,
            MpcMessage::BulkDataAck(_) => MpcMessageKind::BulkDataAck,
            MpcMessage::DebugLog(_) => MpcMessageKind::DebugLog,
            MpcMessage::Blink(_) => MpcMessageKind::Blink,
            MpcMessage::PlayAnimation(_) => MpcMessageKind::PlayAnimation,
            MpcMessage::StopAnimation(_) => MpcMessageKind::StopAnimation,
            MpcMessage::RequestRssi(_) => MpcMessageKind::RequestRssi,
            MpcMessage::Rssi(_) => MpcMessageKind::Rssi,
            MpcMessage::NotifyUser(_) => MpcMessageKind::NotifyUser,
            MpcMessage::NotifyUserAck(_) => MpcMessageKind::NotifyUserAck,
            MpcMessage::SetName(_) => MpcMessageKind::SetName,
            MpcMessage::Temperature(_) => MpcMessageKind::Temperature,
            MpcMessage::SynchronizeTime(_) => MpcMessageKind::SynchronizeTime,
        }
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Codec for the controller message registry.
#[derive(Debug, Clone, Copy)]
pub struct MpcCodec;

impl ProtocolCodec for MpcCodec {
    type Msg = MpcMessage;
    type Kind = MpcMessageKind;

    fn encode(msg: &MpcMessage) -> Vec<u8> {
        match msg {
            MpcMessage::Bare(kind) => vec![*kind as u8],
            MpcMessage::LegacyIAmAMpc(m) => serialize(m),
            MpcMessage::IAmAMpc(m) => m.encode_chunks(),
            MpcMessage::BulkSetup(m) => serialize(m),
            MpcMessage::BulkData(m) => serialize(m),
            MpcMessage::BulkDataAck(m) => serialize(m),
            MpcMessage::DebugLog(m) => serialize(m),
            MpcMessage::Blink(m) => serialize(m),
            MpcMessage::PlayAnimation(m) => serialize(m),
            MpcMessage::StopAnimation(m) => serialize(m),
            MpcMessage::RequestRssi(m) => serialize(m),
            MpcMessage::Rssi(m) => serialize(m),
            MpcMessage::NotifyUser(m) => serialize(m),
            MpcMessage::NotifyUserAck(m) => serialize(m),
            MpcMessage::SetName(m) => serialize(m),
            MpcMessage::Temperature(m) => serialize(m),
            MpcMessage::SynchronizeTime(m) => serialize(m),
        }
    }

    fn decode(bytes: &[u8]) -> Result<MpcMessage, DecodeError> {
        let Some(&tag) = bytes.first() else {
            return Err(DecodeError::Empty);
        };
        let kind = MpcMessageKind::try_from(tag).map_err(|_| DecodeError::UnknownKind(tag))?;
        if bytes.len() == 1 {
            return Ok(MpcMessage::Bare(kind));
        }
        match kind {
            // Legacy firmware sends a fixed 18-byte identification payload;
            // any other length is parsed as chunks.
            MpcMessageKind::IAmAMpc => {
                if bytes.len() == LegacyIAmAMpc::WIRE_SIZE {
                    deserialize(bytes).map(MpcMessage::LegacyIAmAMpc)
                } else {
                    Ok(MpcMessage::IAmAMpc(IAmAMpc::decode_chunks(&bytes[1..])))
                }
            }
            MpcMessageKind::BulkSetup => deserialize(bytes).map(MpcMessage::BulkSetup),
            MpcMessageKind::BulkData => deserialize(bytes).map(MpcMessage::BulkData),
            MpcMessageKind::BulkDataAck => deserialize(bytes).map(MpcMessage::BulkDataAck),
            MpcMessageKind::DebugLog => deserialize(bytes).map(MpcMessage::DebugLog),
            MpcMessageKind::Blink => deserialize(bytes).map(MpcMessage::Blink),
            MpcMessageKind::PlayAnimation => deserialize(bytes).map(MpcMessage::PlayAnimation),
            MpcMessageKind::StopAnimation => deserialize(bytes).map(MpcMessage::StopAnimation),
            MpcMessageKind::RequestRssi => deserialize(bytes).map(MpcMessage::RequestRssi),
            MpcMessageKind::Rssi => deserialize(bytes).map(MpcMessage::Rssi),
            MpcMessageKind::NotifyUser => deserialize(bytes).map(MpcMessage::NotifyUser),
            MpcMessageKind::NotifyUserAck => deserialize(bytes).map(MpcMessage::NotifyUserAck),
            MpcMessageKind::SetName => deserialize(bytes).map(MpcMessage::SetName),
            MpcMessageKind::Temperature => deserialize(bytes).map(MpcMessage::Temperature),
            MpcMessageKind::SynchronizeTime => deserialize(bytes).map(MpcMessage::SynchronizeTime),
            other => {
                tracing::warn!(
                    kind = ?other,
                    len = bytes.len(),
                    "payload bytes on a message kind with no body, ignoring them"
                );
                Ok(MpcMessage::Bare(other))
            }
        }
    }

    fn kind_of(msg: &MpcMessage) -> MpcMessageKind {
        msg.kind()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(msg: &MpcMessage) -> MpcMessage {
        MpcCodec::decode(&MpcCodec::encode(msg)).expect("decode failed")
    }

    #[test]
    fn test_legacy_identification_is_18_bytes() {
        assert_eq!(LegacyIAmAMpc::WIRE_SIZE, 18);
    }

    #[test]
    fn test_legacy_identification_round_trip() {
        let msg = MpcMessage::LegacyIAmAMpc(LegacyIAmAMpc {
            led_count: 32,
            device_id: 0x6502_6502,
            available_flash_size: 2048,
            build_timestamp: 1_680_000_000,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_chunked_identification_round_trip() {
        let msg = MpcMessage::IAmAMpc(IAmAMpc {
            controller_info: DeviceInfoChunk {
                device_id: 0x0BADF00D,
                led_count: 32,
                ..DeviceInfoChunk::default()
            },
            name: NameChunk::new("Conductor"),
            ..IAmAMpc::default()
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_synchronize_time_round_trip() {
        let msg = MpcMessage::SynchronizeTime(SynchronizeTime {
            in_this_many_ms: 250,
            it_will_be_this_many_ms: 123_456_789,
        });
        assert_eq!(round_trip(&msg), msg);
    }

    #[test]
    fn test_stop_animation_round_trip() {
        let msg = MpcMessage::StopAnimation(StopAnimation {
            animation: 3,
            fade_out_time: 500,
        });
        assert_eq!(round_trip(&msg), msg);
    }
}

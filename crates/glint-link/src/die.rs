//! Die adapter: a [`LinkCore`] specialized for Glint dice.
//!
//! Owns the cached [`DieInfo`] (identity, battery, roll state) and keeps it
//! in sync with inbound notifications. Cache setters compare old and new
//! values and emit a [`DieProperty`] change notification only on an actual
//! change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use glint_proto::content_hash;
use glint_proto::die::{
    Blink, BulkData, BulkDataAck, BulkSetup, DieCodec, DieMessage, DieMessageKind, IAmADie,
    LegacyIAmADie, PlayInstantAnimation, PowerOperationMessage, RequestRssi, SetName,
    TransferAnimationSet, TransferInstantAnimationSet, TransferTestAnimationSet,
};
use glint_proto::ident::ApiVersions;
use glint_proto::values::{
    Colorway, DieType, PowerOperation, RollState, TelemetryRequestMode, TransferAck,
};

use crate::bulk::{self, BulkCodec, ProgressFn};
use crate::config::LinkConfig;
use crate::error::{ConnectError, MessageError, SessionError, TransferError};
use crate::link::{ConnectionStatus, LinkCore};
use crate::session::DeviceSession;

impl BulkCodec for DieCodec {
    fn bulk_setup(size: u16) -> DieMessage {
        DieMessage::BulkSetup(BulkSetup { size })
    }

    fn bulk_data(offset: u16, chunk: &[u8]) -> DieMessage {
        DieMessage::BulkData(BulkData {
            size: chunk.len() as u8,
            offset,
            data: chunk.to_vec(),
        })
    }

    fn bulk_setup_ack_kind() -> DieMessageKind {
        DieMessageKind::BulkSetupAck
    }

    fn bulk_data_ack_kind() -> DieMessageKind {
        DieMessageKind::BulkDataAck
    }

    fn bulk_data_ack_offset(msg: &DieMessage) -> Option<u16> {
        match msg {
            DieMessage::BulkDataAck(BulkDataAck { offset }) => Some(*offset),
            _ => None,
        }
    }
}

/// Default advertised name of a die, derived from its device identifier.
pub fn default_die_name(device_id: u32) -> String {
    format!("Glint{device_id:08X}")
}

/// Last-known identity and status of a die.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DieInfo {
    /// Identifier assigned by the platform BLE stack.
    pub system_id: String,
    /// Unique identifier burned into the device, 0 until known.
    pub device_id: u32,
    pub name: String,
    pub led_count: u8,
    pub colorway: Colorway,
    pub die_type: DieType,
    /// UNIX timestamp in seconds of the firmware build, 0 until known.
    pub firmware_timestamp: u32,
    /// Last reported RSSI in dBm, 0 until reported.
    pub rssi: i8,
    pub battery_level: u8,
    pub is_charging: bool,
    pub roll_state: RollState,
    /// Face value currently up; fudge dice report -1, 0 or 1.
    pub current_face: i8,
    pub current_face_index: u8,
    /// Hash of the profile stored on the die.
    pub profile_hash: u32,
}

/// Property change notifications of a [`Die`]. Emitted only when the cached
/// value actually changed.
#[derive(Debug, Clone, PartialEq)]
pub enum DieProperty {
    Status(ConnectionStatus),
    DeviceId(u32),
    Name(String),
    LedCount(u8),
    Colorway(Colorway),
    DieType(DieType),
    FirmwareTimestamp(u32),
    Rssi(i8),
    BatteryLevel(u8),
    Charging(bool),
    RollState(RollState),
    CurrentFace(i8),
    CurrentFaceIndex(u8),
    ProfileHash(u32),
}

/// Structural description of a full profile data set, sized for the
/// transfer setup message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSetStats {
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

/// Structural description of an animation-only data set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnimationSetStats {
    pub palette_size: u16,
    pub rgb_keyframe_count: u16,
    pub rgb_track_count: u16,
    pub keyframe_count: u16,
    pub track_count: u16,
    pub animation_count: u16,
    pub animation_size: u16,
}

/// Die fields known from scan advertisement data.
#[derive(Debug, Clone, Default)]
pub struct DieScanData {
    pub device_id: u32,
    pub name: Option<String>,
    pub led_count: Option<u8>,
    pub colorway: Option<Colorway>,
    pub die_type: Option<DieType>,
    pub firmware_timestamp: Option<u32>,
    pub rssi: Option<i8>,
    pub battery_level: Option<u8>,
    pub is_charging: Option<bool>,
    pub roll_state: Option<RollState>,
    pub current_face_index: Option<u8>,
}

/// A connection to one Glint die.
pub struct Die {
    core: Arc<LinkCore<DieCodec>>,
    info: Mutex<DieInfo>,
    props_tx: broadcast::Sender<DieProperty>,
    transfer_active: AtomicBool,
    config: LinkConfig,
}

impl Die {
    pub fn new(session: Arc<dyn DeviceSession>, config: LinkConfig) -> Arc<Self> {
        Self::with_scan_data(session, config, &DieScanData::default())
    }

    /// Creates a die whose cache is pre-seeded from scan advertisement data.
    pub fn with_scan_data(
        session: Arc<dyn DeviceSession>,
        config: LinkConfig,
        scan: &DieScanData,
    ) -> Arc<Self> {
        let core = LinkCore::new(session);
        let (props_tx, _) = broadcast::channel(64);
        let mut info = DieInfo {
            system_id: core.session().system_id().to_string(),
            name: core.session().advertised_name().unwrap_or_default(),
            device_id: scan.device_id,
            led_count: scan.led_count.unwrap_or(0),
            colorway: scan.colorway.unwrap_or(Colorway::Unknown),
            die_type: scan.die_type.unwrap_or(DieType::Unknown),
            firmware_timestamp: scan.firmware_timestamp.unwrap_or(0),
            ..DieInfo::default()
        };
        if info.die_type == DieType::Unknown && info.led_count > 0 {
            info.die_type = DieType::estimate_from_led_count(info.led_count);
        }
        let die = Arc::new(Self {
            core,
            info: Mutex::new(info),
            props_tx,
            transfer_active: AtomicBool::new(false),
            config,
        });
        die.spawn_listeners();
        die
    }

    // ── Cached info accessors ────────────────────────────────────────────────

    pub fn status(&self) -> ConnectionStatus {
        self.core.status()
    }

    pub fn system_id(&self) -> String {
        self.read_info(|i| i.system_id.clone())
    }

    pub fn device_id(&self) -> u32 {
        self.read_info(|i| i.device_id)
    }

    /// The die name; falls back to the advertised name until the
    /// identification handshake has run.
    pub fn name(&self) -> String {
        let cached = self.read_info(|i| i.name.clone());
        if cached.is_empty() {
            self.core.session().advertised_name().unwrap_or_default()
        } else {
            cached
        }
    }

    pub fn led_count(&self) -> u8 {
        self.read_info(|i| i.led_count)
    }

    pub fn colorway(&self) -> Colorway {
        self.read_info(|i| i.colorway)
    }

    pub fn die_type(&self) -> DieType {
        self.read_info(|i| i.die_type)
    }

    pub fn firmware_timestamp(&self) -> u32 {
        self.read_info(|i| i.firmware_timestamp)
    }

    pub fn rssi(&self) -> i8 {
        self.read_info(|i| i.rssi)
    }

    pub fn battery_level(&self) -> u8 {
        self.read_info(|i| i.battery_level)
    }

    pub fn is_charging(&self) -> bool {
        self.read_info(|i| i.is_charging)
    }

    pub fn roll_state(&self) -> RollState {
        self.read_info(|i| i.roll_state)
    }

    pub fn current_face(&self) -> i8 {
        self.read_info(|i| i.current_face)
    }

    pub fn current_face_index(&self) -> u8 {
        self.read_info(|i| i.current_face_index)
    }

    pub fn profile_hash(&self) -> u32 {
        self.read_info(|i| i.profile_hash)
    }

    pub fn info(&self) -> DieInfo {
        self.read_info(|i| i.clone())
    }

    pub async fn api_versions(&self) -> ApiVersions {
        self.core.versions().await
    }

    // ── Subscriptions ────────────────────────────────────────────────────────

    /// Stream of property changes; one event per actual change.
    pub fn subscribe_properties(&self) -> broadcast::Receiver<DieProperty> {
        self.props_tx.subscribe()
    }

    /// Stream of every decoded inbound message.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<DieMessage> {
        self.core.subscribe_received()
    }

    /// Stream of every sent message, emitted after the write completed.
    pub fn subscribe_sent(&self) -> broadcast::Receiver<DieMessage> {
        self.core.subscribe_sent()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.core.subscribe_status()
    }

    // ── Connection ───────────────────────────────────────────────────────────

    /// Connects and runs the identification handshake.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ConnectError> {
        self.connect_with_timeout(self.config.connect_timeout()).await
    }

    pub async fn connect_with_timeout(
        self: &Arc<Self>,
        timeout: Duration,
    ) -> Result<(), ConnectError> {
        let die = Arc::clone(self);
        self.core
            .connect(timeout, move || async move { die.identify().await })
            .await
    }

    /// Disconnects; a no-op when already disconnected.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.core.disconnect().await
    }

    // ── Messaging ────────────────────────────────────────────────────────────

    pub async fn send_message(
        &self,
        msg: &DieMessage,
        without_ack: bool,
    ) -> Result<(), MessageError> {
        self.core.send_message(msg, without_ack).await
    }

    pub async fn send_and_wait(
        &self,
        msg: &DieMessage,
        response: DieMessageKind,
        timeout: Duration,
    ) -> Result<DieMessage, MessageError> {
        self.core.send_and_wait(msg, response, timeout).await
    }

    pub async fn wait_for_message(
        &self,
        kind: DieMessageKind,
        timeout: Duration,
    ) -> Result<DieMessage, MessageError> {
        self.core.wait_for(kind, timeout).await
    }

    // ── Device operations ────────────────────────────────────────────────────

    /// Renames the die and waits for the confirmation.
    pub async fn rename(&self, name: &str) -> Result<(), MessageError> {
        if name.is_empty() {
            return Err(MessageError::EmptyName);
        }
        // Reprogram even when the cached name matches, in case it is stale.
        self.core
            .send_and_wait(
                &DieMessage::SetName(SetName {
                    name: name.to_string(),
                }),
                DieMessageKind::SetNameAck,
                self.config.ack_timeout(),
            )
            .await?;
        self.update_profile_hash(0);
        self.update_name(name);
        Ok(())
    }

    /// Blinks the die's LEDs and waits for the confirmation.
    pub async fn blink(&self, blink: Blink) -> Result<(), MessageError> {
        self.core
            .send_and_wait(
                &DieMessage::Blink(blink),
                DieMessageKind::BlinkAck,
                self.config.ack_timeout(),
            )
            .await?;
        Ok(())
    }

    /// Starts the faces calibration sequence.
    pub async fn start_calibration(&self) -> Result<(), MessageError> {
        self.core
            .send_message(&DieMessage::Bare(DieMessageKind::Calibrate), false)
            .await
    }

    /// Turns periodic RSSI reports on or off.
    pub async fn report_rssi(&self, activate: bool, min_interval_ms: u16) -> Result<(), MessageError> {
        self.core
            .send_message(
                &DieMessage::RequestRssi(RequestRssi {
                    request_mode: if activate {
                        TelemetryRequestMode::Automatic
                    } else {
                        TelemetryRequestMode::Off
                    },
                    min_interval: min_interval_ms,
                }),
                false,
            )
            .await
    }

    /// Queries a single RSSI reading.
    pub async fn query_rssi(&self) -> Result<i8, MessageError> {
        let response = self
            .core
            .send_and_wait(
                &DieMessage::RequestRssi(RequestRssi {
                    request_mode: TelemetryRequestMode::Once,
                    min_interval: 0,
                }),
                DieMessageKind::Rssi,
                self.config.ack_timeout(),
            )
            .await?;
        match response {
            DieMessage::Rssi(m) => Ok(m.value),
            _ => Ok(0),
        }
    }

    /// Requests the die to completely turn off.
    pub async fn turn_off(&self) -> Result<(), MessageError> {
        self.core
            .send_message(
                &DieMessage::PowerOperation(PowerOperationMessage {
                    operation: PowerOperation::TurnOff,
                }),
                true, // the die powers off before it could acknowledge
            )
            .await
    }

    pub async fn stop_all_animations(&self) -> Result<(), MessageError> {
        self.core
            .send_message(&DieMessage::Bare(DieMessageKind::StopAllAnimations), false)
            .await
    }

    /// Plays an instant animation previously uploaded with
    /// [`Die::transfer_instant_animation_set`].
    pub async fn play_instant_animation(&self, animation: u8) -> Result<(), MessageError> {
        self.core
            .send_message(
                &DieMessage::PlayInstantAnimation(PlayInstantAnimation {
                    animation,
                    ..PlayInstantAnimation::default()
                }),
                false,
            )
            .await
    }

    // ── Data transfers ───────────────────────────────────────────────────────

    /// Uploads a full profile data set into the die's flash memory.
    pub async fn transfer_animation_set(
        &self,
        stats: &ProfileSetStats,
        data: &[u8],
        progress: Option<&ProgressFn>,
    ) -> Result<(), TransferError> {
        let _guard = self.begin_transfer()?;
        let hash = content_hash(data);
        let setup = DieMessage::TransferAnimationSet(TransferAnimationSet {
            palette_size: stats.palette_size,
            rgb_keyframe_count: stats.rgb_keyframe_count,
            rgb_track_count: stats.rgb_track_count,
            keyframe_count: stats.keyframe_count,
            track_count: stats.track_count,
            animation_count: stats.animation_count,
            animation_size: stats.animation_size,
            condition_count: stats.condition_count,
            condition_size: stats.condition_size,
            action_count: stats.action_count,
            action_size: stats.action_size,
            rule_count: stats.rule_count,
            brightness: stats.brightness,
        });
        let response = self
            .core
            .send_and_wait(
                &setup,
                DieMessageKind::TransferAnimationSetAck,
                self.config.ack_timeout(),
            )
            .await
            .map_err(TransferError::from)?;
        let action = match response {
            // Nonzero means the die is ready to download.
            DieMessage::TransferAnimationSetAck(m) if m.result != 0 => TransferAck::Download,
            DieMessage::TransferAnimationSetAck(_) => TransferAck::NoMemory,
            _ => return Err(TransferError::UnexpectedAck { code: 0 }),
        };
        self.run_transfer(
            action,
            DieMessageKind::TransferAnimationSetFinished,
            data,
            progress,
        )
        .await?;
        self.update_profile_hash(hash);
        Ok(())
    }

    /// Uploads a single test animation into RAM and plays it.
    pub async fn transfer_test_animation_set(
        &self,
        stats: &AnimationSetStats,
        data: &[u8],
        progress: Option<&ProgressFn>,
    ) -> Result<(), TransferError> {
        self.transfer_ram_animation_set(
            stats,
            data,
            progress,
            DieMessageKind::TransferTestAnimationSetAck,
            DieMessageKind::TransferTestAnimationSetFinished,
            true,
        )
        .await
    }

    /// Uploads a set of instant animations into RAM. They are lost when the
    /// die sleeps or restarts.
    pub async fn transfer_instant_animation_set(
        &self,
        stats: &AnimationSetStats,
        data: &[u8],
        progress: Option<&ProgressFn>,
    ) -> Result<(), TransferError> {
        self.transfer_ram_animation_set(
            stats,
            data,
            progress,
            DieMessageKind::TransferInstantAnimationSetAck,
            DieMessageKind::TransferInstantAnimationSetFinished,
            false,
        )
        .await
    }

    async fn transfer_ram_animation_set(
        &self,
        stats: &AnimationSetStats,
        data: &[u8],
        progress: Option<&ProgressFn>,
        ack_kind: DieMessageKind,
        finished_kind: DieMessageKind,
        test: bool,
    ) -> Result<(), TransferError> {
        if data.is_empty() {
            return Err(TransferError::EmptyData);
        }
        let _guard = self.begin_transfer()?;
        let hash = content_hash(data);
        let setup = if test {
            DieMessage::TransferTestAnimationSet(TransferTestAnimationSet {
                palette_size: stats.palette_size,
                rgb_keyframe_count: stats.rgb_keyframe_count,
                rgb_track_count: stats.rgb_track_count,
                keyframe_count: stats.keyframe_count,
                track_count: stats.track_count,
                animation_count: stats.animation_count,
                animation_size: stats.animation_size,
                hash,
            })
        } else {
            DieMessage::TransferInstantAnimationSet(TransferInstantAnimationSet {
                palette_size: stats.palette_size,
                rgb_keyframe_count: stats.rgb_keyframe_count,
                rgb_track_count: stats.rgb_track_count,
                keyframe_count: stats.keyframe_count,
                track_count: stats.track_count,
                animation_count: stats.animation_count,
                animation_size: stats.animation_size,
                hash,
            })
        };
        let response = self
            .core
            .send_and_wait(&setup, ack_kind, self.config.ack_timeout())
            .await
            .map_err(TransferError::from)?;
        let code = match response {
            DieMessage::TransferTestAnimationSetAck(m) => m.ack,
            DieMessage::TransferInstantAnimationSetAck(m) => m.ack,
            _ => return Err(TransferError::UnexpectedAck { code: 0 }),
        };
        let action =
            TransferAck::from_u8(code).ok_or(TransferError::UnexpectedAck { code })?;
        self.run_transfer(action, finished_kind, data, progress).await
    }

    async fn run_transfer(
        &self,
        action: TransferAck,
        finished_kind: DieMessageKind,
        data: &[u8],
        progress: Option<&ProgressFn>,
    ) -> Result<(), TransferError> {
        match action {
            TransferAck::Download => {
                debug!(size = data.len(), "device ready to receive data");
                bulk::upload(
                    &self.core,
                    data,
                    finished_kind,
                    self.config.ack_timeout(),
                    self.config.transfer_completion_timeout(),
                    progress,
                )
                .await
            }
            TransferAck::UpToDate => {
                debug!("device data already up to date");
                Ok(())
            }
            TransferAck::NoMemory => {
                warn!(size = data.len(), "device has not enough memory for the data");
                Err(TransferError::OutOfMemory { size: data.len() })
            }
        }
    }

    fn begin_transfer(&self) -> Result<TransferGuard<'_>, TransferError> {
        if self.transfer_active.swap(true, Ordering::SeqCst) {
            return Err(TransferError::InProgress);
        }
        Ok(TransferGuard(&self.transfer_active))
    }

    // ── Identification ───────────────────────────────────────────────────────

    async fn identify(&self) -> Result<(), ConnectError> {
        // Versions are unknown again until the handshake answers.
        self.core.set_versions(ApiVersions::default()).await;
        debug!("waiting on identification message");
        let response = self
            .core
            .send_and_wait(
                &DieMessage::Bare(DieMessageKind::WhoAreYou),
                DieMessageKind::IAmADie,
                self.config.ack_timeout(),
            )
            .await?;
        match response {
            DieMessage::LegacyIAmADie(m) => self.apply_legacy_identity(&m).await,
            DieMessage::IAmADie(m) => self.apply_identity(&m).await,
            _ => Err(ConnectError::Other(
                "empty identification response".to_string(),
            )),
        }
    }

    async fn apply_legacy_identity(&self, m: &LegacyIAmADie) -> Result<(), ConnectError> {
        self.check_device_id(m.device_id)?;
        self.update_led_count(m.led_count);
        self.update_colorway(m.colorway);
        self.update_die_type(m.die_type, m.led_count);
        self.update_firmware_timestamp(m.build_timestamp);
        self.update_battery(m.battery_level_percent, m.battery_state.is_charging_or_done());
        self.update_roll(m.roll_state, m.current_face_index);
        self.update_profile_hash(m.data_set_hash);
        self.core.set_versions(ApiVersions::legacy()).await;
        Ok(())
    }

    async fn apply_identity(&self, m: &IAmADie) -> Result<(), ConnectError> {
        self.check_device_id(m.die_info.device_id)?;
        self.update_led_count(m.die_info.led_count);
        self.update_colorway(m.die_info.colorway);
        self.update_die_type(m.die_info.die_type, m.die_info.led_count);
        self.update_firmware_timestamp(m.version_info.build_timestamp);
        self.update_battery(
            m.status_info.battery_level_percent,
            m.status_info.battery_state.is_charging_or_done(),
        );
        self.update_roll(m.status_info.roll_state, m.status_info.current_face_index);
        self.update_name(&m.die_name.name);
        self.update_profile_hash(m.settings_info.profile_data_hash);
        self.core.set_versions(m.version_info.versions()).await;
        Ok(())
    }

    fn check_device_id(&self, got: u32) -> Result<(), ConnectError> {
        if got == 0 {
            return Err(ConnectError::Other(
                "identification response carries an empty device id".to_string(),
            ));
        }
        let expected = self.device_id();
        if expected == 0 {
            self.update_device_id(got);
            Ok(())
        } else if expected != got {
            Err(ConnectError::IdentityMismatch { expected, got })
        } else {
            Ok(())
        }
    }

    // ── Scan data ────────────────────────────────────────────────────────────

    /// Updates the cache from scan advertisement data. Applied only while
    /// disconnected and only when the device id matches.
    pub fn update_info(&self, scan: &DieScanData) {
        if self.status() != ConnectionStatus::Disconnected || self.device_id() != scan.device_id {
            return;
        }
        if let Some(name) = &scan.name {
            self.update_name(name);
        }
        if let Some(led_count) = scan.led_count {
            if led_count > 0 && self.led_count() == 0 {
                self.update_led_count(led_count);
            }
        }
        if let Some(colorway) = scan.colorway {
            if colorway != Colorway::Unknown && self.colorway() == Colorway::Unknown {
                self.update_colorway(colorway);
            }
        }
        if let Some(die_type) = scan.die_type {
            if die_type != DieType::Unknown && self.die_type() == DieType::Unknown {
                self.update_die_type(die_type, self.led_count());
            }
        }
        if let Some(timestamp) = scan.firmware_timestamp {
            self.update_firmware_timestamp(timestamp);
        }
        if let Some(rssi) = scan.rssi {
            if rssi < 0 {
                self.update_rssi(rssi);
            }
        }
        if let Some(level) = scan.battery_level {
            if level <= 100 {
                self.update_battery(level, scan.is_charging.unwrap_or(self.is_charging()));
            }
        }
        if let (Some(state), Some(face_index)) = (scan.roll_state, scan.current_face_index) {
            if face_index < self.die_type().face_count() {
                self.update_roll(state, face_index);
            }
        }
    }

    // ── Internal listeners ───────────────────────────────────────────────────

    fn spawn_listeners(self: &Arc<Self>) {
        // Cache updates driven by inbound notifications.
        let weak = Arc::downgrade(self);
        let mut messages = self.core.subscribe_received();
        tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(msg) => {
                        let Some(die) = weak.upgrade() else { break };
                        die.on_message(&msg);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "message listener lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        // Mirror status changes onto the property stream.
        let weak = Arc::downgrade(self);
        let mut status_rx = self.core.subscribe_status();
        tokio::spawn(async move {
            loop {
                if status_rx.changed().await.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                let Some(die) = weak.upgrade() else { break };
                die.emit(DieProperty::Status(status));
                // An interrupted link aborts any transfer in flight.
                if !matches!(
                    status,
                    ConnectionStatus::Identifying | ConnectionStatus::Ready
                ) {
                    die.transfer_active.store(false, Ordering::SeqCst);
                }
            }
        });
    }

    fn on_message(&self, msg: &DieMessage) {
        match msg {
            DieMessage::Rssi(m) => self.update_rssi(m.value),
            DieMessage::BatteryLevel(m) => {
                self.update_battery(m.level_percent, m.state.is_charging_or_done());
            }
            DieMessage::RollState(m) => self.update_roll(m.state, m.face_index),
            DieMessage::Bare(
                DieMessageKind::ClearSettingsAck | DieMessageKind::ProgramDefaultParametersFinished,
            ) => {
                // Factory reset: the die reverts to its default advertised
                // name and the factory profile.
                let device_id = self.device_id();
                debug!(device_id, "factory reset notification");
                self.update_name(&default_die_name(device_id));
                self.update_profile_hash(0);
            }
            _ => {}
        }
    }

    // ── Cache setters (notify only on change) ────────────────────────────────

    fn read_info<R>(&self, f: impl FnOnce(&DieInfo) -> R) -> R
    where
        R: Default,
    {
        self.info.lock().map(|info| f(&info)).unwrap_or_default()
    }

    fn emit(&self, prop: DieProperty) {
        let _ = self.props_tx.send(prop);
    }

    fn update_device_id(&self, device_id: u32) {
        let changed = self
            .info
            .lock()
            .map(|mut info| {
                if info.device_id != device_id {
                    info.device_id = device_id;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if changed {
            self.emit(DieProperty::DeviceId(device_id));
        }
    }

    fn update_name(&self, name: &str) {
        if name.is_empty() {
            return;
        }
        let changed = self
            .info
            .lock()
            .map(|mut info| {
                if info.name != name {
                    info.name = name.to_string();
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if changed {
            self.emit(DieProperty::Name(name.to_string()));
        }
    }

    fn update_led_count(&self, led_count: u8) {
        let changed = self
            .info
            .lock()
            .map(|mut info| {
                if info.led_count != led_count {
                    info.led_count = led_count;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if changed {
            self.emit(DieProperty::LedCount(led_count));
        }
    }

    fn update_colorway(&self, colorway: Colorway) {
        let changed = self
            .info
            .lock()
            .map(|mut info| {
                if info.colorway != colorway {
                    info.colorway = colorway;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if changed {
            self.emit(DieProperty::Colorway(colorway));
        }
    }

    fn update_die_type(&self, die_type: DieType, led_count: u8) {
        // Guess from the LED count when the firmware does not know its type.
        let die_type = if die_type == DieType::Unknown {
            DieType::estimate_from_led_count(led_count)
        } else {
            die_type
        };
        let changed = self
            .info
            .lock()
            .map(|mut info| {
                if info.die_type != die_type {
                    info.die_type = die_type;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if changed {
            self.emit(DieProperty::DieType(die_type));
        }
    }

    fn update_firmware_timestamp(&self, timestamp: u32) {
        if timestamp == 0 {
            return;
        }
        let changed = self
            .info
            .lock()
            .map(|mut info| {
                if info.firmware_timestamp != timestamp {
                    info.firmware_timestamp = timestamp;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if changed {
            self.emit(DieProperty::FirmwareTimestamp(timestamp));
        }
    }

    fn update_rssi(&self, rssi: i8) {
        if rssi == 0 {
            return;
        }
        let changed = self
            .info
            .lock()
            .map(|mut info| {
                if info.rssi != rssi {
                    info.rssi = rssi;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if changed {
            self.emit(DieProperty::Rssi(rssi));
        }
    }

    fn update_battery(&self, level: u8, is_charging: bool) {
        let (level_changed, charging_changed) = self
            .info
            .lock()
            .map(|mut info| {
                let level_changed = info.battery_level != level;
                let charging_changed = info.is_charging != is_charging;
                info.battery_level = level;
                info.is_charging = is_charging;
                (level_changed, charging_changed)
            })
            .unwrap_or((false, false));
        if level_changed {
            self.emit(DieProperty::BatteryLevel(level));
        }
        if charging_changed {
            self.emit(DieProperty::Charging(is_charging));
        }
    }

    fn update_roll(&self, state: RollState, face_index: u8) {
        let face = self.die_type().face_from_index(face_index);
        let (state_changed, index_changed, face_changed) = self
            .info
            .lock()
            .map(|mut info| {
                let state_changed = info.roll_state != state;
                let index_changed = info.current_face_index != face_index;
                let face_changed = info.current_face != face;
                info.roll_state = state;
                info.current_face_index = face_index;
                info.current_face = face;
                (state_changed, index_changed, face_changed)
            })
            .unwrap_or((false, false, false));
        if state_changed {
            self.emit(DieProperty::RollState(state));
        }
        if index_changed {
            self.emit(DieProperty::CurrentFaceIndex(face_index));
        }
        if face_changed {
            self.emit(DieProperty::CurrentFace(face));
        }
    }

    fn update_profile_hash(&self, hash: u32) {
        let changed = self
            .info
            .lock()
            .map(|mut info| {
                if info.profile_hash != hash {
                    info.profile_hash = hash;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if changed {
            self.emit(DieProperty::ProfileHash(hash));
        }
    }
}

struct TransferGuard<'a>(&'a AtomicBool);

impl Drop for TransferGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Controller adapter: a [`LinkCore`] specialized for Glint multi-purpose
//! controllers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use glint_proto::ident::ApiVersions;
use glint_proto::mpc::{
    Blink, IAmAMpc, LegacyIAmAMpc, MpcCodec, MpcMessage, MpcMessageKind, PlayAnimation,
    RequestRssi, SetName, StopAnimation, SynchronizeTime,
};
use glint_proto::values::TelemetryRequestMode;

use crate::config::LinkConfig;
use crate::error::{ConnectError, MessageError, SessionError};
use crate::link::{ConnectionStatus, LinkCore};
use crate::session::DeviceSession;

/// Default advertised name of a controller, derived from its device
/// identifier.
pub fn default_mpc_name(device_id: u32) -> String {
    format!("GlintMpc{device_id:08X}")
}

/// Last-known identity and status of a controller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MpcInfo {
    pub system_id: String,
    pub device_id: u32,
    pub name: String,
    pub led_count: u8,
    pub firmware_timestamp: u32,
    pub rssi: i8,
    pub battery_level: u8,
    pub is_charging: bool,
}

/// Property change notifications of an [`Mpc`].
#[derive(Debug, Clone, PartialEq)]
pub enum MpcProperty {
    Status(ConnectionStatus),
    DeviceId(u32),
    Name(String),
    LedCount(u8),
    FirmwareTimestamp(u32),
    Rssi(i8),
    BatteryLevel(u8),
    Charging(bool),
}

/// A connection to one Glint multi-purpose controller.
pub struct Mpc {
    core: Arc<LinkCore<MpcCodec>>,
    info: Mutex<MpcInfo>,
    props_tx: broadcast::Sender<MpcProperty>,
    config: LinkConfig,
}

impl Mpc {
    pub fn new(session: Arc<dyn DeviceSession>, config: LinkConfig) -> Arc<Self> {
        let core = LinkCore::new(session);
        let (props_tx, _) = broadcast::channel(64);
        let info = MpcInfo {
            system_id: core.session().system_id().to_string(),
            name: core.session().advertised_name().unwrap_or_default(),
            ..MpcInfo::default()
        };
        let mpc = Arc::new(Self {
            core,
            info: Mutex::new(info),
            props_tx,
            config,
        });
        mpc.spawn_listeners();
        mpc
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

    pub fn info(&self) -> MpcInfo {
        self.read_info(|i| i.clone())
    }

    pub async fn api_versions(&self) -> ApiVersions {
        self.core.versions().await
    }

    // ── Subscriptions ────────────────────────────────────────────────────────

    pub fn subscribe_properties(&self) -> broadcast::Receiver<MpcProperty> {
        self.props_tx.subscribe()
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<MpcMessage> {
        self.core.subscribe_received()
    }

    pub fn subscribe_sent(&self) -> broadcast::Receiver<MpcMessage> {
        self.core.subscribe_sent()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.core.subscribe_status()
    }

    // ── Connection ───────────────────────────────────────────────────────────

    pub async fn connect(self: &Arc<Self>) -> Result<(), ConnectError> {
        self.connect_with_timeout(self.config.connect_timeout()).await
    }

    pub async fn connect_with_timeout(
        self: &Arc<Self>,
        timeout: Duration,
    ) -> Result<(), ConnectError> {
        let mpc = Arc::clone(self);
        self.core
            .connect(timeout, move || async move { mpc.identify().await })
            .await
    }

    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.core.disconnect().await
    }

    // ── Messaging ────────────────────────────────────────────────────────────

    pub async fn send_message(
        &self,
        msg: &MpcMessage,
        without_ack: bool,
    ) -> Result<(), MessageError> {
        self.core.send_message(msg, without_ack).await
    }

    pub async fn send_and_wait(
        &self,
        msg: &MpcMessage,
        response: MpcMessageKind,
        timeout: Duration,
    ) -> Result<MpcMessage, MessageError> {
        self.core.send_and_wait(msg, response, timeout).await
    }

    pub async fn wait_for_message(
        &self,
        kind: MpcMessageKind,
        timeout: Duration,
    ) -> Result<MpcMessage, MessageError> {
        self.core.wait_for(kind, timeout).await
    }

    // ── Device operations ────────────────────────────────────────────────────

    /// Renames the controller and waits for the confirmation.
    pub async fn rename(&self, name: &str) -> Result<(), MessageError> {
        if name.is_empty() {
            return Err(MessageError::EmptyName);
        }
        self.core
            .send_and_wait(
                &MpcMessage::SetName(SetName {
                    name: name.to_string(),
                }),
                MpcMessageKind::SetNameAck,
                self.config.ack_timeout(),
            )
            .await?;
        self.update_name(name);
        Ok(())
    }

    /// Blinks the controller's LEDs and waits for the confirmation.
    pub async fn blink(&self, blink: Blink) -> Result<(), MessageError> {
        self.core
            .send_and_wait(
                &MpcMessage::Blink(blink),
                MpcMessageKind::BlinkAck,
                self.config.ack_timeout(),
            )
            .await?;
        Ok(())
    }

    /// Plays the animation at the given index.
    pub async fn play_animation(&self, animation: u8) -> Result<(), MessageError> {
        self.core
            .send_message(&MpcMessage::PlayAnimation(PlayAnimation { animation }), false)
            .await
    }

    /// Stops the animation at the given index with a fade-out.
    pub async fn stop_animation(
        &self,
        animation: u8,
        fade_out_time_ms: u16,
    ) -> Result<(), MessageError> {
        self.core
            .send_message(
                &MpcMessage::StopAnimation(StopAnimation {
                    animation,
                    fade_out_time: fade_out_time_ms,
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
                &MpcMessage::RequestRssi(RequestRssi {
                    request_mode: TelemetryRequestMode::Once,
                    min_interval: 0,
                }),
                MpcMessageKind::Rssi,
                self.config.ack_timeout(),
            )
            .await?;
        match response {
            MpcMessage::Rssi(m) => Ok(m.value),
            _ => Ok(0),
        }
    }

    /// Schedules a firmware clock synchronization point.
    pub async fn synchronize_time(
        &self,
        in_this_many_ms: u16,
        it_will_be_this_many_ms: u32,
    ) -> Result<(), MessageError> {
        self.core
            .send_message(
                &MpcMessage::SynchronizeTime(SynchronizeTime {
                    in_this_many_ms,
                    it_will_be_this_many_ms,
                }),
                false,
            )
            .await
    }

    // ── Identification ───────────────────────────────────────────────────────

    async fn identify(&self) -> Result<(), ConnectError> {
        self.core.set_versions(ApiVersions::default()).await;
        debug!("waiting on identification message");
        let response = self
            .core
            .send_and_wait(
                &MpcMessage::Bare(MpcMessageKind::WhoAreYou),
                MpcMessageKind::IAmAMpc,
                self.config.ack_timeout(),
            )
            .await?;
        match response {
            MpcMessage::LegacyIAmAMpc(m) => self.apply_legacy_identity(&m).await,
            MpcMessage::IAmAMpc(m) => self.apply_identity(&m).await,
            _ => Err(ConnectError::Other(
                "empty identification response".to_string(),
            )),
        }
    }

    async fn apply_legacy_identity(&self, m: &LegacyIAmAMpc) -> Result<(), ConnectError> {
        self.check_device_id(m.device_id)?;
        self.update_led_count(m.led_count);
        self.update_firmware_timestamp(m.build_timestamp);
        self.core.set_versions(ApiVersions::legacy()).await;
        Ok(())
    }

    async fn apply_identity(&self, m: &IAmAMpc) -> Result<(), ConnectError> {
        self.check_device_id(m.controller_info.device_id)?;
        self.update_led_count(m.controller_info.led_count);
        self.update_firmware_timestamp(m.version_info.build_timestamp);
        self.update_battery(
            m.status_info.battery_level_percent,
            m.status_info.battery_state.is_charging_or_done(),
        );
        self.update_name(&m.name.name);
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

    // ── Internal listeners ───────────────────────────────────────────────────

    fn spawn_listeners(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let mut messages = self.core.subscribe_received();
        tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(msg) => {
                        let Some(mpc) = weak.upgrade() else { break };
                        mpc.on_message(&msg);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "message listener lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let weak = Arc::downgrade(self);
        let mut status_rx = self.core.subscribe_status();
        tokio::spawn(async move {
            loop {
                if status_rx.changed().await.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                let Some(mpc) = weak.upgrade() else { break };
                mpc.emit(MpcProperty::Status(status));
            }
        });
    }

    fn on_message(&self, msg: &MpcMessage) {
        match msg {
            MpcMessage::Rssi(m) => self.update_rssi(m.value),
            MpcMessage::Bare(MpcMessageKind::ProgramDefaultParametersFinished) => {
                let device_id = self.device_id();
                debug!(device_id, "factory reset notification");
                self.update_name(&default_mpc_name(device_id));
            }
            _ => {}
        }
    }

    // ── Cache setters (notify only on change) ────────────────────────────────

    fn read_info<R>(&self, f: impl FnOnce(&MpcInfo) -> R) -> R
    where
        R: Default,
    {
        self.info.lock().map(|info| f(&info)).unwrap_or_default()
    }

    fn emit(&self, prop: MpcProperty) {
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
            self.emit(MpcProperty::DeviceId(device_id));
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
            self.emit(MpcProperty::Name(name.to_string()));
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
            self.emit(MpcProperty::LedCount(led_count));
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
            self.emit(MpcProperty::FirmwareTimestamp(timestamp));
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
            self.emit(MpcProperty::Rssi(rssi));
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
            self.emit(MpcProperty::BatteryLevel(level));
        }
        if charging_changed {
            self.emit(MpcProperty::Charging(is_charging));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MockDeviceSession;

    fn make_mpc() -> Arc<Mpc> {
        let mut session = MockDeviceSession::new();
        session.expect_system_id().return_const("sys-mpc".to_string());
        session.expect_advertised_name().return_const(None);
        Mpc::new(Arc::new(session), LinkConfig::default())
    }

    #[tokio::test]
    async fn test_rssi_message_updates_cache_once() {
        let mpc = make_mpc();
        let mut props = mpc.subscribe_properties();
        mpc.on_message(&MpcMessage::Rssi(glint_proto::mpc::Rssi { value: -55 }));
        assert_eq!(props.recv().await.unwrap(), MpcProperty::Rssi(-55));
        mpc.on_message(&MpcMessage::Rssi(glint_proto::mpc::Rssi { value: -55 }));
        assert!(props.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_factory_reset_notification_restores_default_name() {
        let mpc = make_mpc();
        mpc.update_device_id(0xAB);
        mpc.update_name("Deck");
        mpc.on_message(&MpcMessage::Bare(
            MpcMessageKind::ProgramDefaultParametersFinished,
        ));
        assert_eq!(mpc.name(), "GlintMpc000000AB");
    }
}

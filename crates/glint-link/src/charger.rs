//! Charger adapter: a [`LinkCore`] specialized for Glint charging cases.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use glint_proto::charger::{
    Blink, ChargerCodec, ChargerMessage, ChargerMessageKind, IAmALcc, LegacyIAmALcc,
    PowerOperationMessage, RequestRssi, SetName, SlotStatus,
};
use glint_proto::ident::ApiVersions;
use glint_proto::values::{PowerOperation, TelemetryRequestMode};

use crate::config::LinkConfig;
use crate::error::{ConnectError, MessageError, SessionError};
use crate::link::{ConnectionStatus, LinkCore};
use crate::session::DeviceSession;

/// Default advertised name of a charger, derived from its device identifier.
pub fn default_charger_name(device_id: u32) -> String {
    format!("GlintLcc{device_id:08X}")
}

/// Last-known identity and status of a charger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChargerInfo {
    pub system_id: String,
    pub device_id: u32,
    pub name: String,
    pub led_count: u8,
    pub firmware_timestamp: u32,
    pub rssi: i8,
    pub battery_level: u8,
    pub is_charging: bool,
    pub available_flash: u32,
    /// Last reported coil slot statuses.
    pub slots: [SlotStatus; 8],
}

/// Property change notifications of a [`Charger`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChargerProperty {
    Status(ConnectionStatus),
    DeviceId(u32),
    Name(String),
    LedCount(u8),
    FirmwareTimestamp(u32),
    Rssi(i8),
    BatteryLevel(u8),
    Charging(bool),
    AvailableFlash(u32),
    Slots([SlotStatus; 8]),
}

/// A connection to one Glint charging case.
pub struct Charger {
    core: Arc<LinkCore<ChargerCodec>>,
    info: Mutex<ChargerInfo>,
    props_tx: broadcast::Sender<ChargerProperty>,
    config: LinkConfig,
}

impl Charger {
    pub fn new(session: Arc<dyn DeviceSession>, config: LinkConfig) -> Arc<Self> {
        let core = LinkCore::new(session);
        let (props_tx, _) = broadcast::channel(64);
        let info = ChargerInfo {
            system_id: core.session().system_id().to_string(),
            name: core.session().advertised_name().unwrap_or_default(),
            ..ChargerInfo::default()
        };
        let charger = Arc::new(Self {
            core,
            info: Mutex::new(info),
            props_tx,
            config,
        });
        charger.spawn_listeners();
        charger
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

    pub fn available_flash(&self) -> u32 {
        self.read_info(|i| i.available_flash)
    }

    pub fn slots(&self) -> [SlotStatus; 8] {
        self.read_info(|i| i.slots)
    }

    pub fn info(&self) -> ChargerInfo {
        self.read_info(|i| i.clone())
    }

    pub async fn api_versions(&self) -> ApiVersions {
        self.core.versions().await
    }

    // ── Subscriptions ────────────────────────────────────────────────────────

    pub fn subscribe_properties(&self) -> broadcast::Receiver<ChargerProperty> {
        self.props_tx.subscribe()
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<ChargerMessage> {
        self.core.subscribe_received()
    }

    pub fn subscribe_sent(&self) -> broadcast::Receiver<ChargerMessage> {
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
        let charger = Arc::clone(self);
        self.core
            .connect(timeout, move || async move { charger.identify().await })
            .await
    }

    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.core.disconnect().await
    }

    // ── Messaging ────────────────────────────────────────────────────────────

    pub async fn send_message(
        &self,
        msg: &ChargerMessage,
        without_ack: bool,
    ) -> Result<(), MessageError> {
        self.core.send_message(msg, without_ack).await
    }

    pub async fn send_and_wait(
        &self,
        msg: &ChargerMessage,
        response: ChargerMessageKind,
        timeout: Duration,
    ) -> Result<ChargerMessage, MessageError> {
        self.core.send_and_wait(msg, response, timeout).await
    }

    pub async fn wait_for_message(
        &self,
        kind: ChargerMessageKind,
        timeout: Duration,
    ) -> Result<ChargerMessage, MessageError> {
        self.core.wait_for(kind, timeout).await
    }

    // ── Device operations ────────────────────────────────────────────────────

    /// Renames the charger and waits for the confirmation.
    pub async fn rename(&self, name: &str) -> Result<(), MessageError> {
        if name.is_empty() {
            return Err(MessageError::EmptyName);
        }
        self.core
            .send_and_wait(
                &ChargerMessage::SetName(SetName {
                    name: name.to_string(),
                }),
                ChargerMessageKind::SetNameAck,
                self.config.ack_timeout(),
            )
            .await?;
        self.update_name(name);
        Ok(())
    }

    /// Blinks the charger's LEDs and waits for the confirmation.
    pub async fn blink(&self, blink: Blink) -> Result<(), MessageError> {
        self.core
            .send_and_wait(
                &ChargerMessage::Blink(blink),
                ChargerMessageKind::BlinkAck,
                self.config.ack_timeout(),
            )
            .await?;
        Ok(())
    }

    /// Queries a single RSSI reading.
    pub async fn query_rssi(&self) -> Result<i8, MessageError> {
        let response = self
            .core
            .send_and_wait(
                &ChargerMessage::RequestRssi(RequestRssi {
                    request_mode: TelemetryRequestMode::Once,
                    min_interval: 0,
                }),
                ChargerMessageKind::Rssi,
                self.config.ack_timeout(),
            )
            .await?;
        match response {
            ChargerMessage::Rssi(m) => Ok(m.value),
            _ => Ok(0),
        }
    }

    /// Changes the charger's power state.
    pub async fn power_operation(&self, operation: PowerOperation) -> Result<(), MessageError> {
        self.core
            .send_message(
                &ChargerMessage::PowerOperation(PowerOperationMessage { operation }),
                true,
            )
            .await
    }

    /// Asks for a slots status report; the answer arrives as a notification
    /// and updates the cached [`ChargerInfo::slots`].
    pub async fn request_slots_statuses(&self) -> Result<(), MessageError> {
        self.core
            .send_message(
                &ChargerMessage::Bare(ChargerMessageKind::RequestSlotsStatuses),
                false,
            )
            .await
    }

    /// Queries the internal temperatures, in hundredths of a degree Celsius.
    pub async fn query_temperature(&self) -> Result<(u16, u16), MessageError> {
        let response = self
            .core
            .send_and_wait(
                &ChargerMessage::Bare(ChargerMessageKind::RequestTemperature),
                ChargerMessageKind::Temperature,
                self.config.ack_timeout(),
            )
            .await?;
        match response {
            ChargerMessage::Temperature(m) => Ok((
                m.mcu_temperature_times_100,
                m.battery_temperature_times_100,
            )),
            _ => Ok((0, 0)),
        }
    }

    // ── Identification ───────────────────────────────────────────────────────

    async fn identify(&self) -> Result<(), ConnectError> {
        self.core.set_versions(ApiVersions::default()).await;
        debug!("waiting on identification message");
        let response = self
            .core
            .send_and_wait(
                &ChargerMessage::Bare(ChargerMessageKind::WhoAreYou),
                ChargerMessageKind::IAmALcc,
                self.config.ack_timeout(),
            )
            .await?;
        match response {
            ChargerMessage::LegacyIAmALcc(m) => self.apply_legacy_identity(&m).await,
            ChargerMessage::IAmALcc(m) => self.apply_identity(&m).await,
            _ => Err(ConnectError::Other(
                "empty identification response".to_string(),
            )),
        }
    }

    async fn apply_legacy_identity(&self, m: &LegacyIAmALcc) -> Result<(), ConnectError> {
        self.check_device_id(m.device_id)?;
        self.update_led_count(m.led_count);
        self.update_firmware_timestamp(m.build_timestamp);
        self.update_battery(m.battery_level_percent, m.battery_state.is_charging_or_done());
        self.core.set_versions(ApiVersions::legacy()).await;
        Ok(())
    }

    async fn apply_identity(&self, m: &IAmALcc) -> Result<(), ConnectError> {
        self.check_device_id(m.charger_info.device_id)?;
        self.update_led_count(m.charger_info.led_count);
        self.update_firmware_timestamp(m.version_info.build_timestamp);
        self.update_battery(
            m.status_info.battery_level_percent,
            m.status_info.battery_state.is_charging_or_done(),
        );
        self.update_available_flash(m.settings_info.available_flash);
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
                        let Some(charger) = weak.upgrade() else { break };
                        charger.on_message(&msg);
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
                let Some(charger) = weak.upgrade() else { break };
                charger.emit(ChargerProperty::Status(status));
            }
        });
    }

    fn on_message(&self, msg: &ChargerMessage) {
        match msg {
            ChargerMessage::Rssi(m) => self.update_rssi(m.value),
            ChargerMessage::BatteryLevel(m) => {
                self.update_battery(m.level_percent, m.state.is_charging_or_done());
            }
            ChargerMessage::SlotsStatuses(m) => self.update_slots(m.slots),
            ChargerMessage::Bare(ChargerMessageKind::ProgramDefaultParametersFinished) => {
                let device_id = self.device_id();
                debug!(device_id, "factory reset notification");
                self.update_name(&default_charger_name(device_id));
            }
            _ => {}
        }
    }

    // ── Cache setters (notify only on change) ────────────────────────────────

    fn read_info<R>(&self, f: impl FnOnce(&ChargerInfo) -> R) -> R
    where
        R: Default,
    {
        self.info.lock().map(|info| f(&info)).unwrap_or_default()
    }

    fn emit(&self, prop: ChargerProperty) {
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
            self.emit(ChargerProperty::DeviceId(device_id));
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
            self.emit(ChargerProperty::Name(name.to_string()));
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
            self.emit(ChargerProperty::LedCount(led_count));
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
            self.emit(ChargerProperty::FirmwareTimestamp(timestamp));
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
            self.emit(ChargerProperty::Rssi(rssi));
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
            self.emit(ChargerProperty::BatteryLevel(level));
        }
        if charging_changed {
            self.emit(ChargerProperty::Charging(is_charging));
        }
    }

    fn update_available_flash(&self, available: u32) {
        let changed = self
            .info
            .lock()
            .map(|mut info| {
                if info.available_flash != available {
                    info.available_flash = available;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if changed {
            self.emit(ChargerProperty::AvailableFlash(available));
        }
    }

    fn update_slots(&self, slots: [SlotStatus; 8]) {
        let changed = self
            .info
            .lock()
            .map(|mut info| {
                if info.slots != slots {
                    info.slots = slots;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if changed {
            self.emit(ChargerProperty::Slots(slots));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MockDeviceSession;
    use glint_proto::charger::SlotsStatuses;
    use glint_proto::values::SlotState;

    fn make_charger() -> Arc<Charger> {
        let mut session = MockDeviceSession::new();
        session
            .expect_system_id()
            .return_const("sys-charger".to_string());
        session.expect_advertised_name().return_const(None);
        Charger::new(Arc::new(session), LinkConfig::default())
    }

    #[tokio::test]
    async fn test_slots_notification_updates_cache_once() {
        let charger = make_charger();
        let mut props = charger.subscribe_properties();
        let mut slots = [SlotStatus::default(); 8];
        slots[2].state = SlotState::Charging;
        slots[2].die_present = true;

        charger.on_message(&ChargerMessage::SlotsStatuses(SlotsStatuses { slots }));
        assert_eq!(props.recv().await.unwrap(), ChargerProperty::Slots(slots));

        // The same report again must not notify.
        charger.on_message(&ChargerMessage::SlotsStatuses(SlotsStatuses { slots }));
        assert!(props.try_recv().is_err());
        assert_eq!(charger.slots()[2].state, SlotState::Charging);
    }

    #[tokio::test]
    async fn test_factory_reset_notification_restores_default_name() {
        let charger = make_charger();
        charger.update_device_id(0x12345678);
        charger.update_name("Shelf dock");
        charger.on_message(&ChargerMessage::Bare(
            ChargerMessageKind::ProgramDefaultParametersFinished,
        ));
        assert_eq!(charger.name(), "GlintLcc12345678");
    }

    #[tokio::test]
    async fn test_rename_rejects_empty_name() {
        let charger = make_charger();
        assert!(matches!(
            charger.rename("").await,
            Err(MessageError::EmptyName)
        ));
    }
}

//! End-to-end tests for the charger and controller links.

mod common;

use std::sync::Arc;

use common::FakeSession;
use glint_link::charger::{Charger, ChargerProperty};
use glint_link::config::LinkConfig;
use glint_link::link::ConnectionStatus;
use glint_link::mpc::Mpc;
use glint_proto::charger::{
    ChargerCodec, ChargerMessage, ChargerMessageKind, IAmALcc, LegacyIAmALcc, SlotStatus,
    SlotsStatuses,
};
use glint_proto::ident::{DeviceInfoChunk, NameChunk, SettingsInfoChunk, StatusInfoChunk, VersionInfoChunk};
use glint_proto::mpc::{IAmAMpc, LegacyIAmAMpc, MpcMessageKind};
use glint_proto::schema::serialize;
use glint_proto::values::{BatteryState, SlotState};
use glint_proto::ProtocolCodec;

fn charger_session(reply: Vec<u8>) -> Arc<FakeSession> {
    Arc::new(FakeSession::new("sys-charger", move |written| {
        if written.first() == Some(&(ChargerMessageKind::WhoAreYou as u8)) {
            vec![reply.clone()]
        } else {
            Vec::new()
        }
    }))
}

fn mpc_session(reply: Vec<u8>) -> Arc<FakeSession> {
    Arc::new(FakeSession::new("sys-mpc", move |written| {
        if written.first() == Some(&(MpcMessageKind::WhoAreYou as u8)) {
            vec![reply.clone()]
        } else {
            Vec::new()
        }
    }))
}

// ── Charger ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_charger_connects_with_legacy_20_byte_identification() {
    let reply = serialize(&LegacyIAmALcc {
        led_count: 8,
        device_id: 0x1CC0_0001,
        available_flash_size: 2000,
        build_timestamp: 1_620_000_000,
        battery_level_percent: 73,
        battery_state: BatteryState::Charging,
    });
    assert_eq!(reply.len(), 20);
    let session = charger_session(reply);
    let charger = Charger::new(session, LinkConfig::default());

    charger.connect().await.unwrap();

    assert_eq!(charger.status(), ConnectionStatus::Ready);
    assert_eq!(charger.device_id(), 0x1CC0_0001);
    assert_eq!(charger.led_count(), 8);
    assert_eq!(charger.battery_level(), 73);
    assert!(charger.is_charging());
    assert_eq!(charger.firmware_timestamp(), 1_620_000_000);
}

#[tokio::test]
async fn test_charger_connects_with_five_chunk_identification() {
    let identity = IAmALcc {
        version_info: VersionInfoChunk {
            firmware_version: 0x0100,
            build_timestamp: 1_690_000_000,
            settings_version: 0x0100,
            compat_standard_api_version: 0x0100,
            compat_extended_api_version: 0x0100,
            compat_management_api_version: 0x0100,
            ..VersionInfoChunk::default()
        },
        charger_info: DeviceInfoChunk {
            device_id: 0x1CC0_0002,
            led_count: 8,
            ..DeviceInfoChunk::default()
        },
        name: NameChunk::new("Desk dock"),
        settings_info: SettingsInfoChunk {
            available_flash: 1024,
            total_usable_flash: 4096,
            ..SettingsInfoChunk::default()
        },
        status_info: StatusInfoChunk {
            battery_level_percent: 91,
            battery_state: BatteryState::Done,
            ..StatusInfoChunk::default()
        },
    };
    let session = charger_session(identity.encode_chunks());
    let charger = Charger::new(session, LinkConfig::default());

    charger.connect().await.unwrap();

    assert_eq!(charger.status(), ConnectionStatus::Ready);
    assert_eq!(charger.device_id(), 0x1CC0_0002);
    assert_eq!(charger.name(), "Desk dock", "name comes from the name chunk");
    assert_eq!(charger.battery_level(), 91);
    assert!(charger.is_charging());
    assert_eq!(charger.available_flash(), 1024);
    assert_eq!(charger.api_versions().await.firmware_version, 0x0100);
}

#[tokio::test]
async fn test_charger_slots_report_updates_cache_and_notifies() {
    let reply = serialize(&LegacyIAmALcc {
        led_count: 8,
        device_id: 0x1CC0_0003,
        ..LegacyIAmALcc::default()
    });
    let session = charger_session(reply);
    let charger = Charger::new(session.clone(), LinkConfig::default());
    charger.connect().await.unwrap();

    let mut props = charger.subscribe_properties();
    let mut slots = [SlotStatus::default(); 8];
    slots[0] = SlotStatus {
        raw_current: -100,
        current: 320,
        state: SlotState::Charging,
        die_present: true,
        skipped: false,
        charged_once: false,
    };
    slots[5].state = SlotState::Fod;
    session
        .notify(ChargerCodec::encode(&ChargerMessage::SlotsStatuses(
            SlotsStatuses { slots },
        )))
        .await;

    let received = loop {
        if let ChargerProperty::Slots(slots) = props.recv().await.unwrap() {
            break slots;
        }
    };
    assert_eq!(received, slots);
    assert_eq!(charger.slots()[0].current, 320);
    assert_eq!(charger.slots()[5].state, SlotState::Fod);
}

// ── Controller ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_mpc_connects_with_legacy_18_byte_identification() {
    let reply = serialize(&LegacyIAmAMpc {
        led_count: 32,
        device_id: 0x3C00_0001,
        available_flash_size: 512,
        build_timestamp: 1_640_000_000,
    });
    assert_eq!(reply.len(), 18);
    let session = mpc_session(reply);
    let mpc = Mpc::new(session, LinkConfig::default());

    mpc.connect().await.unwrap();

    assert_eq!(mpc.status(), ConnectionStatus::Ready);
    assert_eq!(mpc.device_id(), 0x3C00_0001);
    assert_eq!(mpc.led_count(), 32);
    assert_eq!(mpc.firmware_timestamp(), 1_640_000_000);
}

#[tokio::test]
async fn test_mpc_connects_with_chunked_identification() {
    let identity = IAmAMpc {
        controller_info: DeviceInfoChunk {
            device_id: 0x3C00_0002,
            led_count: 32,
            ..DeviceInfoChunk::default()
        },
        name: NameChunk::new("Conductor"),
        status_info: StatusInfoChunk {
            battery_level_percent: 44,
            battery_state: BatteryState::Ok,
            ..StatusInfoChunk::default()
        },
        ..IAmAMpc::default()
    };
    let session = mpc_session(identity.encode_chunks());
    let mpc = Mpc::new(session, LinkConfig::default());

    mpc.connect().await.unwrap();

    assert_eq!(mpc.status(), ConnectionStatus::Ready);
    assert_eq!(mpc.name(), "Conductor");
    assert_eq!(mpc.battery_level(), 44);
    assert!(!mpc.is_charging());
}

#[tokio::test]
async fn test_mpc_play_animation_reaches_the_wire() {
    let reply = serialize(&LegacyIAmAMpc {
        led_count: 32,
        device_id: 0x3C00_0003,
        ..LegacyIAmAMpc::default()
    });
    let session = mpc_session(reply);
    let mpc = Mpc::new(session.clone(), LinkConfig::default());
    mpc.connect().await.unwrap();

    mpc.play_animation(2).await.unwrap();
    mpc.stop_animation(2, 250).await.unwrap();

    assert_eq!(session.writes_with_tag(MpcMessageKind::PlayAnimation as u8), 1);
    assert_eq!(session.writes_with_tag(MpcMessageKind::StopAnimation as u8), 1);
}

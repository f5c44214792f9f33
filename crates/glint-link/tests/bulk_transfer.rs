//! End-to-end tests for the bulk transfer protocol on a die link.
//!
//! The scripted device acknowledges the transfer setup, then each data
//! chunk by echoing its offset, and finally reports the transfer as applied
//! — or misbehaves in the specific ways the error paths care about.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::FakeSession;
use glint_link::config::LinkConfig;
use glint_link::die::{AnimationSetStats, Die, ProfileSetStats};
use glint_link::error::{MessageError, TransferError};
use glint_proto::constants::MAX_MESSAGE_SIZE;
use glint_proto::content_hash;
use glint_proto::die::{
    DieCodec, DieMessage, DieMessageKind, LegacyIAmADie, TransferAnimationSetAck,
    TransferInstantAnimationSetAck,
};
use glint_proto::schema::serialize;
use glint_proto::values::TransferAck;
use glint_proto::ProtocolCodec;

const BULK_DATA: u8 = DieMessageKind::BulkData as u8;

fn identity_reply() -> Vec<u8> {
    serialize(&LegacyIAmADie {
        led_count: 20,
        device_id: 0x0D1E_0001,
        ..LegacyIAmADie::default()
    })
}

/// State observed by the simulated device during a transfer.
#[derive(Default)]
struct DeviceState {
    /// Payload bytes reassembled from the received chunks.
    received: Vec<u8>,
    /// Hash advertised in the instant-animation setup message.
    advertised_hash: Option<u32>,
    announced_size: usize,
}

/// A device that answers the identification request and follows the bulk
/// transfer protocol.
///
/// `setup_ack` is its answer to the transfer setup; `ack_limit` bounds how
/// many chunks it acknowledges (`None` for all); `finished` is the
/// notification it sends once the full payload arrived (`None` for a device
/// that never confirms).
fn device_responder(
    state: Arc<Mutex<DeviceState>>,
    setup_ack: TransferAck,
    ack_limit: Option<usize>,
    finished: Option<DieMessageKind>,
) -> impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send {
    let mut acked_chunks = 0usize;
    move |written| {
        let Ok(msg) = DieCodec::decode(written) else {
            return Vec::new();
        };
        match msg {
            DieMessage::Bare(DieMessageKind::WhoAreYou) => vec![identity_reply()],
            DieMessage::TransferInstantAnimationSet(setup) => {
                state.lock().unwrap().advertised_hash = Some(setup.hash);
                vec![DieCodec::encode(&DieMessage::TransferInstantAnimationSetAck(
                    TransferInstantAnimationSetAck {
                        ack: setup_ack as u8,
                    },
                ))]
            }
            DieMessage::TransferAnimationSet(_) => {
                // Flash transfers use the older ack: nonzero means proceed.
                let result = u8::from(setup_ack == TransferAck::Download);
                vec![DieCodec::encode(&DieMessage::TransferAnimationSetAck(
                    TransferAnimationSetAck { result },
                ))]
            }
            DieMessage::BulkSetup(setup) => {
                let mut state = state.lock().unwrap();
                state.announced_size = setup.size as usize;
                state.received.clear();
                vec![vec![DieMessageKind::BulkSetupAck as u8]]
            }
            DieMessage::BulkData(chunk) => {
                if let Some(limit) = ack_limit {
                    if acked_chunks >= limit {
                        // Swallow the chunk: its acknowledgment is lost.
                        return Vec::new();
                    }
                }
                acked_chunks += 1;
                let mut state = state.lock().unwrap();
                state
                    .received
                    .extend_from_slice(&chunk.data[..chunk.size as usize]);
                let mut replies = vec![DieCodec::encode(&DieMessage::BulkDataAck(
                    glint_proto::die::BulkDataAck {
                        offset: chunk.offset,
                    },
                ))];
                if state.received.len() >= state.announced_size {
                    if let Some(kind) = finished {
                        // Validation finished: confirm out-of-band.
                        replies.push(vec![kind as u8]);
                    }
                }
                replies
            }
            _ => Vec::new(),
        }
    }
}

async fn connected_die(
    state: &Arc<Mutex<DeviceState>>,
    setup_ack: TransferAck,
    ack_limit: Option<usize>,
    finished: Option<DieMessageKind>,
) -> (Arc<FakeSession>, Arc<Die>) {
    let session = Arc::new(FakeSession::new(
        "sys-die",
        device_responder(state.clone(), setup_ack, ack_limit, finished),
    ));
    let die = Die::new(session.clone(), LinkConfig::default());
    die.connect().await.unwrap();
    (session, die)
}

// ── Happy path ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_1024_byte_payload_transfers_in_11_chunks_and_hash_matches() {
    let state = Arc::new(Mutex::new(DeviceState::default()));
    let (session, die) = connected_die(
        &state,
        TransferAck::Download,
        None,
        Some(DieMessageKind::TransferInstantAnimationSetFinished),
    )
    .await;

    let data: Vec<u8> = (0..1024u32).map(|i| (i * 7) as u8).collect();
    let progress = Arc::new(Mutex::new(Vec::<f32>::new()));
    let progress_log = progress.clone();

    die.transfer_instant_animation_set(
        &AnimationSetStats {
            animation_count: 1,
            animation_size: data.len() as u16,
            ..AnimationSetStats::default()
        },
        &data,
        Some(&move |fraction| progress_log.lock().unwrap().push(fraction)),
    )
    .await
    .unwrap();

    // 10 full chunks plus 1 partial.
    assert_eq!(session.writes_with_tag(BULK_DATA), 11);

    let state = state.lock().unwrap();
    assert_eq!(state.received.len(), 1024);
    assert_eq!(state.received, data, "reassembled payload matches");
    assert_eq!(
        state.advertised_hash,
        Some(content_hash(&state.received)),
        "hash advertised in the setup equals the hash of the reassembled chunks"
    );

    // One progress callback per acknowledged chunk, ending at 1.0.
    let progress = progress.lock().unwrap();
    assert_eq!(progress.len(), 11);
    assert!((progress[progress.len() - 1] - 1.0).abs() < f32::EPSILON);
    assert!(progress.windows(2).all(|w| w[0] < w[1]), "monotonic progress");
}

#[tokio::test]
async fn test_payload_smaller_than_one_chunk_transfers_in_one_send() {
    let state = Arc::new(Mutex::new(DeviceState::default()));
    let (session, die) = connected_die(
        &state,
        TransferAck::Download,
        None,
        Some(DieMessageKind::TransferInstantAnimationSetFinished),
    )
    .await;

    let data = vec![0x5A; MAX_MESSAGE_SIZE / 2];
    die.transfer_instant_animation_set(&AnimationSetStats::default(), &data, None)
        .await
        .unwrap();

    assert_eq!(session.writes_with_tag(BULK_DATA), 1);
    assert_eq!(state.lock().unwrap().received, data);
}

#[tokio::test]
async fn test_up_to_date_device_skips_the_upload_entirely() {
    let state = Arc::new(Mutex::new(DeviceState::default()));
    let (session, die) = connected_die(
        &state,
        TransferAck::UpToDate,
        None,
        Some(DieMessageKind::TransferInstantAnimationSetFinished),
    )
    .await;

    die.transfer_instant_animation_set(&AnimationSetStats::default(), &[1, 2, 3, 4], None)
        .await
        .unwrap();

    assert_eq!(session.writes_with_tag(DieMessageKind::BulkSetup as u8), 0);
    assert_eq!(session.writes_with_tag(BULK_DATA), 0);
}

#[tokio::test]
async fn test_flash_profile_transfer_updates_profile_hash() {
    let state = Arc::new(Mutex::new(DeviceState::default()));
    let (session, die) = connected_die(
        &state,
        TransferAck::Download,
        None,
        Some(DieMessageKind::TransferAnimationSetFinished),
    )
    .await;

    let data = vec![3u8; 256];
    die.transfer_animation_set(&ProfileSetStats::default(), &data, None)
        .await
        .unwrap();

    assert_eq!(session.writes_with_tag(BULK_DATA), 3);
    assert_eq!(state.lock().unwrap().received, data);
    assert_eq!(die.profile_hash(), content_hash(&data));
}

// ── Failure paths ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_no_memory_rejects_immediately_with_zero_chunks_sent() {
    let state = Arc::new(Mutex::new(DeviceState::default()));
    let (session, die) = connected_die(
        &state,
        TransferAck::NoMemory,
        None,
        Some(DieMessageKind::TransferInstantAnimationSetFinished),
    )
    .await;

    let data = vec![0u8; 512];
    let result = die
        .transfer_instant_animation_set(&AnimationSetStats::default(), &data, None)
        .await;

    assert!(matches!(
        result,
        Err(TransferError::OutOfMemory { size: 512 })
    ));
    assert_eq!(session.writes_with_tag(BULK_DATA), 0, "no chunk may be sent");
}

#[tokio::test(start_paused = true)]
async fn test_lost_chunk_ack_stops_the_transfer_before_the_next_chunk() {
    let state = Arc::new(Mutex::new(DeviceState::default()));
    // The device acknowledges only the first 3 chunks.
    let (session, die) = connected_die(
        &state,
        TransferAck::Download,
        Some(3),
        Some(DieMessageKind::TransferInstantAnimationSetFinished),
    )
    .await;

    let data = vec![0xA5u8; 1024];
    let result = die
        .transfer_instant_animation_set(&AnimationSetStats::default(), &data, None)
        .await;

    assert!(matches!(
        result,
        Err(TransferError::Message(MessageError::Timeout { .. }))
    ));
    // Chunk 4 was sent and timed out waiting for its ack; chunk 5 never
    // went out.
    assert_eq!(session.writes_with_tag(BULK_DATA), 4);
}

#[tokio::test(start_paused = true)]
async fn test_missing_finished_notification_is_a_completion_timeout() {
    let state = Arc::new(Mutex::new(DeviceState::default()));
    // A device that acknowledges everything but never confirms having
    // applied the data.
    let (session, die) = connected_die(&state, TransferAck::Download, None, None).await;

    let data = vec![1u8; 300];
    let result = die
        .transfer_instant_animation_set(&AnimationSetStats::default(), &data, None)
        .await;

    assert!(matches!(
        result,
        Err(TransferError::CompletionTimeout { .. })
    ));
    // Every chunk was still acknowledged.
    assert_eq!(session.writes_with_tag(BULK_DATA), 3);
}

#[tokio::test]
async fn test_finished_notification_arriving_during_upload_resolves_the_wait() {
    // The scripted device sends the finished notification together with the
    // last chunk ack, before the completion wait starts; the wait must
    // resolve immediately instead of hanging.
    let state = Arc::new(Mutex::new(DeviceState::default()));
    let (_session, die) = connected_die(
        &state,
        TransferAck::Download,
        None,
        Some(DieMessageKind::TransferInstantAnimationSetFinished),
    )
    .await;

    tokio::time::timeout(
        Duration::from_secs(5),
        die.transfer_instant_animation_set(&AnimationSetStats::default(), &[9u8; 150], None),
    )
    .await
    .expect("transfer must not hang")
    .unwrap();
}

#[tokio::test]
async fn test_empty_payload_is_rejected_before_any_exchange() {
    let state = Arc::new(Mutex::new(DeviceState::default()));
    let (session, die) = connected_die(
        &state,
        TransferAck::Download,
        None,
        Some(DieMessageKind::TransferInstantAnimationSetFinished),
    )
    .await;

    let result = die
        .transfer_instant_animation_set(&AnimationSetStats::default(), &[], None)
        .await;

    assert!(matches!(result, Err(TransferError::EmptyData)));
    assert_eq!(
        session.writes_with_tag(DieMessageKind::TransferInstantAnimationSet as u8),
        0
    );
}

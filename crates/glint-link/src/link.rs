//! Connection state machine shared by all device adapters.
//!
//! A [`LinkCore`] owns one [`DeviceSession`] and drives it through the
//! connection lifecycle:
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──session up──► Identifying
//!      ▲                                                      │
//!      │                                            identification done
//!      └──── Disconnecting ◄── disconnect() / failure ◄───── Ready
//! ```
//!
//! The core is generic over the device kind's [`ProtocolCodec`]; the
//! adapters supply the identification exchange and everything
//! device-specific. Inbound messages are decoded on a dedicated dispatch
//! task and delivered, in arrival order, to one-shot waiters first and then
//! to the broadcast stream of received messages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, warn};

use glint_proto::constants::{API_VERSION, COMPAT_API_VERSION};
use glint_proto::ident::ApiVersions;
use glint_proto::ProtocolCodec;

use crate::error::{CompatSide, ConnectError, MessageError, SessionError};
use crate::session::{DeviceSession, SessionEvent};

/// Connection status of a device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Identifying,
    Ready,
    Disconnecting,
}

/// Transport, state machine and message plumbing of one device link.
pub struct LinkCore<C: ProtocolCodec> {
    session: Arc<dyn DeviceSession>,
    status_tx: watch::Sender<ConnectionStatus>,
    received_tx: broadcast::Sender<C::Msg>,
    sent_tx: broadcast::Sender<C::Msg>,
    waiters: Mutex<HashMap<C::Kind, Vec<(u64, oneshot::Sender<C::Msg>)>>>,
    waiter_seq: AtomicU64,
    versions: tokio::sync::Mutex<ApiVersions>,
}

impl<C: ProtocolCodec> LinkCore<C> {
    pub fn new(session: Arc<dyn DeviceSession>) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (received_tx, _) = broadcast::channel(64);
        let (sent_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            session,
            status_tx,
            received_tx,
            sent_tx,
            waiters: Mutex::new(HashMap::new()),
            waiter_seq: AtomicU64::new(0),
            versions: tokio::sync::Mutex::new(ApiVersions::default()),
        })
    }

    pub fn session(&self) -> &Arc<dyn DeviceSession> {
        &self.session
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    /// Watches connection status changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Stream of every successfully decoded inbound message.
    pub fn subscribe_received(&self) -> broadcast::Receiver<C::Msg> {
        self.received_tx.subscribe()
    }

    /// Stream of every message sent, emitted after the write completed.
    pub fn subscribe_sent(&self) -> broadcast::Receiver<C::Msg> {
        self.sent_tx.subscribe()
    }

    /// API versions negotiated during identification.
    pub async fn versions(&self) -> ApiVersions {
        *self.versions.lock().await
    }

    pub async fn set_versions(&self, versions: ApiVersions) {
        *self.versions.lock().await = versions;
    }

    // ── Status transitions ───────────────────────────────────────────────────

    fn set_status(&self, status: ConnectionStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                debug!(from = ?*current, to = ?status, "status changed");
                *current = status;
                true
            }
        });
    }

    /// Atomically moves `from` to `to`; returns whether the transition
    /// happened.
    fn try_transition(&self, from: ConnectionStatus, to: ConnectionStatus) -> bool {
        let mut moved = false;
        self.status_tx.send_if_modified(|current| {
            if *current == from {
                debug!(from = ?from, to = ?to, "status changed");
                *current = to;
                moved = true;
                true
            } else {
                false
            }
        });
        moved
    }

    // ── Connect / disconnect ─────────────────────────────────────────────────

    /// Runs the connection sequence: session connect (bounded by `timeout`
    /// unless zero), subscribe, then the adapter-supplied identification
    /// future, ending in `Ready`.
    ///
    /// At most one caller drives the handshake. A second `connect` while the
    /// sequence is underway awaits the existing sequence's outcome instead
    /// of starting another; connecting while `Ready` is a no-op.
    pub async fn connect<F, Fut>(
        self: &Arc<Self>,
        timeout: Duration,
        identify: F,
    ) -> Result<(), ConnectError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), ConnectError>>,
    {
        match self.status() {
            ConnectionStatus::Ready => return Ok(()),
            ConnectionStatus::Connecting | ConnectionStatus::Identifying => {
                return self.await_existing_handshake().await;
            }
            ConnectionStatus::Disconnecting => {
                return Err(ConnectError::Cancelled {
                    status: ConnectionStatus::Disconnecting,
                });
            }
            ConnectionStatus::Disconnected => {}
        }

        if !self.try_transition(ConnectionStatus::Disconnected, ConnectionStatus::Connecting) {
            // Another caller won the race and is driving the handshake.
            return self.await_existing_handshake().await;
        }

        match self.drive_connect(timeout, identify).await {
            Ok(()) => {
                if self.try_transition(ConnectionStatus::Identifying, ConnectionStatus::Ready) {
                    Ok(())
                } else {
                    // The status moved under us, e.g. a concurrent disconnect.
                    Err(ConnectError::Cancelled {
                        status: self.status(),
                    })
                }
            }
            Err(err) => {
                warn!(%err, "disconnecting after connection failure");
                // Best-effort cleanup; its own error is swallowed so the
                // original failure stays primary.
                let _ = self.session.disconnect().await;
                self.clear_waiters();
                if self.status() != ConnectionStatus::Disconnected {
                    self.set_status(ConnectionStatus::Disconnecting);
                    self.set_status(ConnectionStatus::Disconnected);
                }
                Err(err)
            }
        }
    }

    async fn drive_connect<F, Fut>(
        self: &Arc<Self>,
        timeout: Duration,
        identify: F,
    ) -> Result<(), ConnectError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), ConnectError>>,
    {
        debug!(timeout_ms = timeout.as_millis() as u64, "connecting session");
        let connect = self.session.connect();
        if timeout.is_zero() {
            connect.await?;
        } else {
            tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| ConnectError::Timeout(timeout))??;
        }

        if !self.try_transition(ConnectionStatus::Connecting, ConnectionStatus::Identifying) {
            return Err(ConnectError::Cancelled {
                status: self.status(),
            });
        }

        let events = self.session.subscribe().await?;
        self.spawn_dispatch(events);

        identify().await
    }

    /// Awaits the outcome of a handshake driven by another `connect` call.
    async fn await_existing_handshake(&self) -> Result<(), ConnectError> {
        let mut status_rx = self.status_tx.subscribe();
        loop {
            let status = *status_rx.borrow_and_update();
            match status {
                ConnectionStatus::Ready => return Ok(()),
                ConnectionStatus::Disconnected | ConnectionStatus::Disconnecting => {
                    return Err(ConnectError::Cancelled { status });
                }
                _ => {}
            }
            if status_rx.changed().await.is_err() {
                return Err(ConnectError::Cancelled {
                    status: self.status(),
                });
            }
        }
    }

    /// Requests disconnection. Calling this while already disconnected is a
    /// no-op.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        if self.status() == ConnectionStatus::Disconnected {
            debug!("already disconnected");
            return Ok(());
        }
        self.set_status(ConnectionStatus::Disconnecting);
        self.clear_waiters();
        let result = self.session.disconnect().await;
        self.set_status(ConnectionStatus::Disconnected);
        result
    }

    // ── Inbound dispatch ─────────────────────────────────────────────────────

    fn spawn_dispatch(self: &Arc<Self>, mut events: mpsc::Receiver<SessionEvent>) {
        let core = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(core) = core.upgrade() else { break };
                match event {
                    SessionEvent::Notification(bytes) => core.dispatch(&bytes),
                    SessionEvent::Disconnected { reason } => {
                        debug!(?reason, "session reported disconnection");
                        core.clear_waiters();
                        if core.status() != ConnectionStatus::Disconnected {
                            core.set_status(ConnectionStatus::Disconnecting);
                            core.set_status(ConnectionStatus::Disconnected);
                        }
                        break;
                    }
                }
            }
        });
    }

    fn dispatch(&self, bytes: &[u8]) {
        match C::decode(bytes) {
            Ok(msg) => {
                let kind = C::kind_of(&msg);
                debug!(?kind, len = bytes.len(), "message received");
                // Resolve one-shot waiters first so a response cannot race
                // the broadcast subscribers, then notify the stream.
                let pending = self
                    .waiters
                    .lock()
                    .ok()
                    .and_then(|mut map| map.remove(&kind));
                if let Some(pending) = pending {
                    for (_, tx) in pending {
                        let _ = tx.send(msg.clone());
                    }
                }
                let _ = self.received_tx.send(msg);
            }
            Err(err) => {
                // A bad message is dropped, not fatal to the link.
                warn!(%err, len = bytes.len(), "dropping message that failed to decode");
            }
        }
    }

    fn clear_waiters(&self) {
        if let Ok(mut map) = self.waiters.lock() {
            // Dropping the senders rejects every pending wait immediately.
            map.clear();
        }
    }

    // ── Sending and waiting ──────────────────────────────────────────────────

    /// Sends a message. With `without_ack` the write does not request a
    /// transport-level confirmation.
    pub async fn send_message(&self, msg: &C::Msg, without_ack: bool) -> Result<(), MessageError> {
        self.check_compatibility(C::kind_of(msg)).await?;
        let data = C::encode(msg);
        debug!(kind = ?C::kind_of(msg), len = data.len(), "sending message");
        self.session.write_value(&data, without_ack).await?;
        let _ = self.sent_tx.send(msg.clone());
        Ok(())
    }

    /// Registers a one-shot waiter for the next message of `kind`.
    ///
    /// Registering before sending a request guarantees a fast response
    /// cannot be missed. Every waiter for a kind resolves when a message of
    /// that kind arrives.
    pub fn register_waiter(self: &Arc<Self>, kind: C::Kind) -> Waiter<C> {
        let (tx, rx) = oneshot::channel();
        let id = self.waiter_seq.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut map) = self.waiters.lock() {
            map.entry(kind).or_default().push((id, tx));
        }
        Waiter {
            core: Arc::clone(self),
            kind,
            id,
            rx,
        }
    }

    /// Waits for the next message of `kind`, without sending anything.
    pub async fn wait_for(
        self: &Arc<Self>,
        kind: C::Kind,
        timeout: Duration,
    ) -> Result<C::Msg, MessageError> {
        self.register_waiter(kind).wait(timeout).await
    }

    /// Sends `msg` and waits for the next message of `response` kind.
    pub async fn send_and_wait(
        self: &Arc<Self>,
        msg: &C::Msg,
        response: C::Kind,
        timeout: Duration,
    ) -> Result<C::Msg, MessageError> {
        let waiter = self.register_waiter(response);
        self.send_message(msg, false).await?;
        waiter.wait(timeout).await
    }

    fn remove_waiter(&self, kind: C::Kind, id: u64) {
        if let Ok(mut map) = self.waiters.lock() {
            if let Some(pending) = map.get_mut(&kind) {
                pending.retain(|(waiter_id, _)| *waiter_id != id);
                if pending.is_empty() {
                    map.remove(&kind);
                }
            }
        }
    }

    /// Refuses to send once the negotiated versions show either side below
    /// the other's compatibility floor. Unknown (zero) versions are treated
    /// as compatible.
    async fn check_compatibility(&self, kind: C::Kind) -> Result<(), MessageError> {
        let versions = self.versions().await;
        if versions.firmware_version > 0 && COMPAT_API_VERSION > versions.firmware_version {
            return Err(MessageError::Incompatible {
                kind: format!("{kind:?}"),
                side: CompatSide::Library,
                lib_version: COMPAT_API_VERSION,
                fw_version: versions.firmware_version,
            });
        }
        if versions.compat_standard_api_version > 0
            && API_VERSION < versions.compat_standard_api_version
        {
            return Err(MessageError::Incompatible {
                kind: format!("{kind:?}"),
                side: CompatSide::Firmware,
                lib_version: API_VERSION,
                fw_version: versions.compat_standard_api_version,
            });
        }
        Ok(())
    }
}

/// A registered one-shot wait for a message of a given kind.
///
/// The wait resolves with whichever comes first: the message, a
/// disconnection, or the timeout. All hooks are released together when the
/// wait ends, however it ends.
pub struct Waiter<C: ProtocolCodec> {
    core: Arc<LinkCore<C>>,
    kind: C::Kind,
    id: u64,
    rx: oneshot::Receiver<C::Msg>,
}

impl<C: ProtocolCodec> Waiter<C> {
    pub async fn wait(mut self, timeout: Duration) -> Result<C::Msg, MessageError> {
        let mut status_rx = self.core.status_tx.subscribe();
        let disconnected = async move {
            loop {
                if status_rx.changed().await.is_err() {
                    return;
                }
                let status = *status_rx.borrow_and_update();
                if matches!(
                    status,
                    ConnectionStatus::Disconnecting | ConnectionStatus::Disconnected
                ) {
                    return;
                }
            }
        };

        tokio::select! {
            result = &mut self.rx => match result {
                Ok(msg) => Ok(msg),
                // The waiter table was cleared by a disconnection.
                Err(_) => Err(MessageError::Disconnected {
                    kind: format!("{:?}", self.kind),
                }),
            },
            _ = disconnected => Err(MessageError::Disconnected {
                kind: format!("{:?}", self.kind),
            }),
            _ = tokio::time::sleep(timeout) => Err(MessageError::Timeout {
                kind: format!("{:?}", self.kind),
                timeout,
            }),
        }
    }
}

impl<C: ProtocolCodec> Drop for Waiter<C> {
    fn drop(&mut self) {
        self.core.remove_waiter(self.kind, self.id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MockDeviceSession;
    use glint_proto::die::{DieCodec, DieMessage, DieMessageKind};

    fn stub_session() -> MockDeviceSession {
        let mut session = MockDeviceSession::new();
        session.expect_system_id().return_const("stub".to_string());
        session.expect_advertised_name().return_const(None);
        session
    }

    #[tokio::test]
    async fn test_new_link_starts_disconnected() {
        let core = LinkCore::<DieCodec>::new(Arc::new(stub_session()));
        assert_eq!(core.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_is_a_no_op() {
        // The session must not even be asked to disconnect.
        let core = LinkCore::<DieCodec>::new(Arc::new(stub_session()));
        assert!(core.disconnect().await.is_ok());
        assert_eq!(core.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_try_transition_only_moves_from_expected_state() {
        let core = LinkCore::<DieCodec>::new(Arc::new(stub_session()));
        assert!(core.try_transition(ConnectionStatus::Disconnected, ConnectionStatus::Connecting));
        assert!(!core.try_transition(ConnectionStatus::Disconnected, ConnectionStatus::Connecting));
        assert_eq!(core.status(), ConnectionStatus::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_times_out_when_nothing_arrives() {
        let core = LinkCore::<DieCodec>::new(Arc::new(stub_session()));
        let result = core
            .wait_for(DieMessageKind::Rssi, Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(MessageError::Timeout { .. })));
        // The waiter must not leak.
        assert!(core.waiters.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_resolves_waiter_and_broadcast() {
        let core = LinkCore::<DieCodec>::new(Arc::new(stub_session()));
        let mut stream = core.subscribe_received();
        let waiter = core.register_waiter(DieMessageKind::Rssi);

        core.dispatch(&[DieMessageKind::Rssi as u8, 0xD6]); // -42 dBm

        let msg = waiter.wait(Duration::from_secs(1)).await.unwrap();
        assert!(matches!(msg, DieMessage::Rssi(ref m) if m.value == -42));
        let broadcast = stream.recv().await.unwrap();
        assert_eq!(broadcast, msg);
        assert!(core.waiters.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_message_is_dropped_without_resolving_waiters() {
        let core = LinkCore::<DieCodec>::new(Arc::new(stub_session()));
        let waiter = core.register_waiter(DieMessageKind::Rssi);
        core.dispatch(&[0xFF, 1, 2]); // unknown type tag
        // Waiter is still pending.
        drop(waiter);
        assert!(core.waiters.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compatibility_gate_blocks_old_firmware() {
        let core = LinkCore::<DieCodec>::new(Arc::new(stub_session()));
        core.set_versions(ApiVersions {
            firmware_version: 0x00FF, // below the library floor
            ..ApiVersions::default()
        })
        .await;
        let result = core
            .check_compatibility(DieMessageKind::Blink)
            .await;
        assert!(matches!(
            result,
            Err(MessageError::Incompatible {
                side: CompatSide::Library,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_compatibility_gate_blocks_old_library() {
        let core = LinkCore::<DieCodec>::new(Arc::new(stub_session()));
        core.set_versions(ApiVersions {
            firmware_version: API_VERSION,
            compat_standard_api_version: API_VERSION + 1,
            ..ApiVersions::default()
        })
        .await;
        let result = core.check_compatibility(DieMessageKind::Blink).await;
        assert!(matches!(
            result,
            Err(MessageError::Incompatible {
                side: CompatSide::Firmware,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unknown_versions_are_treated_as_compatible() {
        let core = LinkCore::<DieCodec>::new(Arc::new(stub_session()));
        assert!(core
            .check_compatibility(DieMessageKind::Blink)
            .await
            .is_ok());
    }
}

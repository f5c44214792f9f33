//! Scripted in-memory session used by the end-to-end tests.
//!
//! A `FakeSession` plays the role of the platform BLE transport: writes are
//! recorded and handed to a responder closure whose replies come back as
//! notifications, exactly like a device answering on the notify
//! characteristic.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use glint_link::error::SessionError;
use glint_link::session::{DeviceSession, DisconnectReason, SessionEvent};

/// Installs a test subscriber so `RUST_LOG=debug cargo test` shows the link
/// traffic of a failing test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

pub struct FakeSession {
    system_id: String,
    advertised_name: Option<String>,
    connect_delay: Duration,
    responder: Mutex<Responder>,
    events_tx: Mutex<Option<mpsc::Sender<SessionEvent>>>,
    written: Mutex<Vec<Vec<u8>>>,
}

impl FakeSession {
    /// A session whose device answers writes through `responder`.
    pub fn new(
        system_id: &str,
        responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    ) -> Self {
        Self {
            system_id: system_id.to_string(),
            advertised_name: None,
            connect_delay: Duration::ZERO,
            responder: Mutex::new(Box::new(responder)),
            events_tx: Mutex::new(None),
            written: Mutex::new(Vec::new()),
        }
    }

    /// A session whose device never answers anything.
    pub fn silent(system_id: &str) -> Self {
        Self::new(system_id, |_| Vec::new())
    }

    pub fn advertised(mut self, name: &str) -> Self {
        self.advertised_name = Some(name.to_string());
        self
    }

    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Pushes an unsolicited notification, like a device-initiated report.
    pub async fn notify(&self, bytes: Vec<u8>) {
        let tx = self.events_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            tx.send(SessionEvent::Notification(bytes)).await.unwrap();
        }
    }

    /// Simulates the peripheral dropping the link.
    pub async fn drop_link(&self) {
        let tx = self.events_tx.lock().unwrap().take();
        if let Some(tx) = tx {
            let _ = tx
                .send(SessionEvent::Disconnected {
                    reason: DisconnectReason::LinkLoss,
                })
                .await;
        }
    }

    /// Everything written to the session so far.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    /// Number of writes whose leading type tag is `tag`.
    pub fn writes_with_tag(&self, tag: u8) -> usize {
        self.written
            .lock()
            .unwrap()
            .iter()
            .filter(|data| data.first() == Some(&tag))
            .count()
    }
}

#[async_trait]
impl DeviceSession for FakeSession {
    fn system_id(&self) -> &str {
        &self.system_id
    }

    fn advertised_name(&self) -> Option<String> {
        self.advertised_name.clone()
    }

    async fn connect(&self) -> Result<(), SessionError> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        let tx = self.events_tx.lock().unwrap().take();
        if let Some(tx) = tx {
            let _ = tx
                .send(SessionEvent::Disconnected {
                    reason: DisconnectReason::Requested,
                })
                .await;
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<SessionEvent>, SessionError> {
        let (tx, rx) = mpsc::channel(64);
        *self.events_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn write_value(&self, data: &[u8], _without_ack: bool) -> Result<(), SessionError> {
        self.written.lock().unwrap().push(data.to_vec());
        let replies = (self.responder.lock().unwrap())(data);
        let tx = self.events_tx.lock().unwrap().clone();
        let Some(tx) = tx else {
            return Err(SessionError::NotConnected);
        };
        for reply in replies {
            let _ = tx.send(SessionEvent::Notification(reply)).await;
        }
        Ok(())
    }
}

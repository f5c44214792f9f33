//! Bulk transfer: chunked, fully-acknowledged upload of a payload to a
//! connected device.
//!
//! The sender announces the total size, then pushes the payload in chunks
//! of at most the protocol's message-size ceiling. Every chunk send blocks
//! until the device acknowledges it by echoing the chunk's offset — strict
//! in-order delivery, no pipelining. Once all chunks are acknowledged the
//! device still has to validate and apply the data, which it confirms with
//! an out-of-band "finished" notification with its own, longer timeout.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use glint_proto::constants::MAX_MESSAGE_SIZE;
use glint_proto::ProtocolCodec;

use crate::error::{MessageError, TransferError};
use crate::link::LinkCore;

/// Bulk transfer messages of a device registry.
pub trait BulkCodec: ProtocolCodec {
    fn bulk_setup(size: u16) -> Self::Msg;
    fn bulk_data(offset: u16, chunk: &[u8]) -> Self::Msg;
    fn bulk_setup_ack_kind() -> Self::Kind;
    fn bulk_data_ack_kind() -> Self::Kind;
    /// The offset echoed by a chunk acknowledgment, when `msg` is one.
    fn bulk_data_ack_offset(msg: &Self::Msg) -> Option<u16>;
}

/// Callback invoked with the acknowledged fraction (0..=1) of the payload.
pub type ProgressFn = dyn Fn(f32) + Send + Sync;

/// Uploads `data` over a connected link and waits for the device to confirm
/// it with a notification of `finished_kind`.
///
/// The finished listener is registered before the first byte goes out, so a
/// device that validates faster than the upload loop returns cannot be
/// missed — the final wait then resolves immediately.
pub async fn upload<C: BulkCodec>(
    core: &Arc<LinkCore<C>>,
    data: &[u8],
    finished_kind: C::Kind,
    ack_timeout: Duration,
    completion_timeout: Duration,
    progress: Option<&ProgressFn>,
) -> Result<(), TransferError> {
    let finished = core.register_waiter(finished_kind);

    debug!(total = data.len(), "starting bulk transfer");
    core.send_and_wait(
        &C::bulk_setup(data.len() as u16),
        C::bulk_setup_ack_kind(),
        ack_timeout,
    )
    .await?;

    let mut offset = 0usize;
    while offset < data.len() {
        let end = (offset + MAX_MESSAGE_SIZE).min(data.len());
        let chunk = &data[offset..end];
        let ack = core
            .send_and_wait(
                &C::bulk_data(offset as u16, chunk),
                C::bulk_data_ack_kind(),
                ack_timeout,
            )
            .await?;
        if let Some(acked) = C::bulk_data_ack_offset(&ack) {
            if acked as usize != offset {
                warn!(expected = offset, acked, "chunk acknowledgment offset mismatch");
            }
        }
        offset = end;
        if let Some(callback) = progress {
            callback(offset as f32 / data.len() as f32);
        }
    }

    debug!("bulk data sent, waiting for the device to apply it");
    match finished.wait(completion_timeout).await {
        Ok(_) => {
            debug!("bulk transfer confirmed");
            Ok(())
        }
        Err(MessageError::Timeout { .. }) => Err(TransferError::CompletionTimeout {
            timeout: completion_timeout,
        }),
        Err(err) => Err(err.into()),
    }
}

/// Number of chunks a payload of `len` bytes will be split into.
pub fn chunk_count(len: usize) -> usize {
    len.div_ceil(MAX_MESSAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_count_rounds_up() {
        assert_eq!(chunk_count(0), 0);
        assert_eq!(chunk_count(1), 1);
        assert_eq!(chunk_count(MAX_MESSAGE_SIZE), 1);
        assert_eq!(chunk_count(MAX_MESSAGE_SIZE + 1), 2);
        assert_eq!(chunk_count(1024), 11);
    }
}

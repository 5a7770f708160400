use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use docflux_client::ConvertJob;
use docflux_common::protocol::Result;
use tokio::sync::oneshot;

/// Unique identifier for a queued conversion.
pub type RequestId = u64;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One queued conversion together with its reply slot.
///
/// The reply channel is the single synchronization point between the
/// worker and the caller: the worker pushes exactly one terminal result
/// and the caller waits on the other end with its own deadline.
#[derive(Debug)]
pub struct ConvertRequest {
    pub id: RequestId,
    pub job: ConvertJob,
    reply: oneshot::Sender<Result<String>>,
}

impl ConvertRequest {
    pub(crate) fn new(job: ConvertJob) -> (Self, oneshot::Receiver<Result<String>>) {
        let (reply, receiver) = oneshot::channel();
        (
            Self {
                id: generate_request_id(),
                job,
                reply,
            },
            receiver,
        )
    }

    /// Delivers the terminal result.
    ///
    /// Non-blocking: a caller that timed out has dropped its receiver, in
    /// which case the result is silently discarded.
    pub(crate) fn resolve(self, result: Result<String>) {
        let _ = self.reply.send(result);
    }
}

/// Generates a unique request ID: seconds since the epoch in the upper 32
/// bits, an atomic counter in the lower 32.
fn generate_request_id() -> RequestId {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    (timestamp << 32) | (counter & 0xFFFFFFFF)
}

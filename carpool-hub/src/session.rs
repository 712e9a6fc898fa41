use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use carpool_shared::UserId;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Result of offering a frame to a session's mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Mailbox at capacity; the consumer is too slow
    Full,
    /// Session already torn down or its reader went away
    Closed,
}

/// One live client connection. The transport owns the receiving half of
/// the mailbox and writes whatever arrives to the socket; dropping the
/// sender here ends that writer loop.
#[derive(Debug)]
pub struct Session {
    id: u64,
    user_id: UserId,
    open_id: Option<String>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
}

impl Session {
    pub fn open(
        user_id: UserId,
        open_id: Option<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let session = Arc::new(Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            user_id,
            open_id: open_id.filter(|id| !id.is_empty()),
            outbound: Mutex::new(Some(tx)),
        });
        (session, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn open_id(&self) -> Option<&str> {
        self.open_id.as_deref()
    }

    /// Non-blocking enqueue
    pub fn offer(&self, frame: String) -> Delivery {
        let outbound = self.outbound.lock();
        match outbound.as_ref() {
            None => Delivery::Closed,
            Some(tx) => match tx.try_send(frame) {
                Ok(()) => Delivery::Queued,
                Err(TrySendError::Full(_)) => Delivery::Full,
                Err(TrySendError::Closed(_)) => Delivery::Closed,
            },
        }
    }

    /// Close the mailbox. Returns true only for the call that actually closed it.
    pub fn close(&self) -> bool {
        self.outbound.lock().take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.lock().is_none()
    }
}

use visca_core::{Address, Frame};
use visca_types::{CameraState, ConnectionState};

use crate::error::ConnectionError;

/// All events the engine emits.
///
/// Users subscribe via `client.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<StatusEvent>`.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// Connection state machine moved
    ConnectionChanged {
        previous: ConnectionState,
        current: ConnectionState,
    },
    /// A connection attempt failed, or reconnecting was given up
    ConnectionError(ConnectionError),
    /// Cached state of one camera changed
    CameraChanged {
        address: Address,
        state: CameraState,
    },
    /// Frame that matched no outstanding request
    Unsolicited(Frame),
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<StatusEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<StatusEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}

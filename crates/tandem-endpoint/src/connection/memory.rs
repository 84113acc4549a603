//! In-memory transport: two adapters wired back to back.

use tracing::debug;

use super::{ConnectionAdapter, TransportCommand, TransportHandle, channel};

/// Two connected adapters. Text sent on one arrives on the other.
///
/// Both sides see `Opened` immediately. Closing either side (or dropping
/// its adapter) closes both. Must be called inside a tokio runtime.
pub fn pair() -> (ConnectionAdapter, ConnectionAdapter) {
    let (left, left_handle) = channel();
    let (right, right_handle) = channel();
    drop(tokio::spawn(relay(left_handle, right_handle)));
    (left, right)
}

async fn relay(mut left: TransportHandle, mut right: TransportHandle) {
    left.opened();
    right.opened();

    loop {
        tokio::select! {
            cmd = left.next_command() => match cmd {
                Some(TransportCommand::SendText(text)) => right.message(text),
                Some(TransportCommand::Close) | None => break,
            },
            cmd = right.next_command() => match cmd {
                Some(TransportCommand::SendText(text)) => left.message(text),
                Some(TransportCommand::Close) | None => break,
            },
        }
    }

    debug!("in-memory connection closed");
    left.closed();
    right.closed();
}

//! The control channel between the executor starter and Steam.
//!
//! The executor starter queues outgoing messages on a [`SteamOutbox`],
//! and the transport delivers incoming messages via
//! [`ExecutorStarter::deliver`](crate::ExecutorStarter::deliver).
//! Tests can play the role of Steam by holding both ends of the outbox.

mod websocket;

use tokio::sync::mpsc;

pub use websocket::SteamConnection;

use crate::protocol::SteamMessage;

pub type SteamOutbox = mpsc::UnboundedSender<SteamMessage>;
pub type SteamOutboxReceiver = mpsc::UnboundedReceiver<SteamMessage>;

pub fn outbox() -> (SteamOutbox, SteamOutboxReceiver) {
    mpsc::unbounded_channel()
}

//! Node-to-node replication over UDP multicast
//!
//! Best effort: no acknowledgment, retransmission, or reordering detection.
//! A replica that misses a transfer is repaired by the coordinator's next
//! reconcile pass.

pub mod codec;
pub mod receiver;
pub mod sender;

pub use codec::{MessageType, ReplicationMessage, MAX_DATAGRAM};
pub use receiver::{multicast_socket, Applied, Receiver};
pub use sender::{BroadcastReport, Broadcaster};

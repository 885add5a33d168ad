//! VPN client link
//!
//! Talks to the VPN client through its native messaging bridge and
//! publishes [`ClientState`] snapshots.

pub mod bridge;
pub mod link;
pub mod message;
pub mod state;
pub mod transport;

pub use bridge::ProcessBridge;
pub use link::{ClientLink, LinkSettings};
pub use message::{ClientCommand, ClientVersion};
pub use state::{ActiveConnection, ClientKind, ClientState, IsolationKey};
pub use transport::{NativeTransport, TransportEvent};

//! Peer-facing side of the consensus engine.
//!
//! The wire transport itself (handshake, framing, sockets) lives outside this
//! workspace; the engine talks to it only through [`PeerTransport`].
//! [`PeerHealth`] keeps the per-peer bookkeeping the round coordinator needs
//! when picking peers: cool-downs after rejections and consecutive timeouts.

pub mod error;
pub mod peer_health;
pub mod transport;

pub use error::NetworkError;
pub use peer_health::PeerHealth;
pub use transport::{PeerInfo, PeerTransport};

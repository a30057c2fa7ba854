use tangle_types::NodeId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("connection to {0} closed")]
    NodeConnectionClosed(NodeId),

    #[error("peer {0} did not answer in time")]
    NodeTimeout(NodeId),

    #[error("peer {0} not found")]
    PeerNotFound(NodeId),

    #[error("message error: {0}")]
    Message(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl NetworkError {
    /// Protocol code reported in logs and to the coordinator.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NodeConnectionClosed(_) => "node_connection_closed",
            Self::NodeTimeout(_) => "node_timeout",
            Self::PeerNotFound(_) => "peer_not_found",
            Self::Message(_) => "message_error",
            Self::Transport(_) => "transport_error",
        }
    }
}

impl From<tangle_messages::MessageError> for NetworkError {
    fn from(e: tangle_messages::MessageError) -> Self {
        Self::Message(e.to_string())
    }
}

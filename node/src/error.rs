use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("consensus error: {0}")]
    Consensus(#[from] tangle_consensus::ConsensusError),

    #[error("store error: {0}")]
    Store(#[from] tangle_store::StoreError),

    #[error("network error: {0}")]
    Network(#[from] tangle_network::NetworkError),

    #[error("mutex error: {0}")]
    Mutex(#[from] tangle_utils::MutexError),

    #[error("message error: {0}")]
    Message(#[from] tangle_messages::MessageError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("node already started")]
    AlreadyStarted,

    #[error("node was stopped and cannot be restarted")]
    Stopped,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("framing error: {0}")]
    Framing(String),

    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("connection closed")]
    Closed,

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("service/method request ill-formed: {0}")]
    InvalidServiceMethod(String),

    #[error("can't find service {0}")]
    UnknownService(String),

    #[error("can't find method {0}")]
    UnknownMethod(String),

    #[error("service already registered: {0}")]
    DuplicateService(String),

    #[error("no available servers")]
    NoAvailableServers,

    #[error("registry error: {0}")]
    Registry(String),

    #[error("remote error: {0}")]
    Remote(String),
}

pub type Result<T> = std::result::Result<T, RpcError>;

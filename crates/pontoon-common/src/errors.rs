#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("missing 'channel' field")]
    MissingChannel,

    #[error("'channel' is not a string")]
    ChannelNotAString,

    #[error("'channel' is empty")]
    EmptyChannel,

    #[error("message has none of 'args', 'result' or 'error'")]
    UnknownShape,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("transport send failed: {0}")]
    SendFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no handler registered for channel: {0}")]
    HandlerNotFound(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("listener failed: {0}")]
    Listener(String),

    #[error("synchronous call timed out after {0} ms")]
    Timeout(u64),

    #[error("synchronous call refused: calling thread delivers transport messages")]
    WouldDeadlock,

    #[error("no tokio runtime available: {0}")]
    Runtime(String),
}

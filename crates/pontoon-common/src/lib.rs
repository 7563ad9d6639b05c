pub mod errors;
pub mod token;

pub use errors::{BridgeError, DecodeError, TransportError};
pub use token::{ListenerToken, SubscriberToken};

pub type Result<T> = std::result::Result<T, BridgeError>;

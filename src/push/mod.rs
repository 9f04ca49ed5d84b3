//! Real-time order push channel.

mod backoff;
mod client;
mod endpoint;
pub mod stomp;
mod transport;

pub use backoff::ReconnectPolicy;
pub use client::{ConnectionState, PushClient, PushStatus};
pub use endpoint::push_endpoint;
pub use transport::{NativeSocketTransport, PushError, PushSession, PushTransport, StompTransport};

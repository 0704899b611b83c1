//! Model Context Protocol (MCP) client implementation
//!
//! A [`McpSession`] runs the handshake and typed operations over any
//! [`transport::Transport`], matching replies to requests through the
//! [`correlator::RequestCorrelator`] and re-establishing lost connections
//! with the [`reconnect::ReconnectController`].

pub mod correlator;
pub mod error;
pub mod events;
pub mod protocol;
pub mod reconnect;
pub mod session;
pub mod transport;

// Re-export common types for easier imports
pub use error::{McpError, McpResult};
pub use events::{EventBus, EventKind, SessionEvent, SubscriptionId};
pub use reconnect::ReconnectPolicy;
pub use session::{McpOperations, McpSession, SessionConfig, SessionState};
pub use transport::{SseTransport, Transport, TransportKind, WebSocketTransport};

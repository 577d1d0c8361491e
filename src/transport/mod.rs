//! Session-oriented duplex transport.

mod handler;
mod listener;
mod messages;
mod session;

pub use handler::{ProviderFactory, TransportCore};
pub use listener::{cleanup_socket, create_listener, run_listener};
pub use messages::{ClientCommand, ConnectConfig, ProviderDescriptor, ServerEvent};
pub use session::{SessionAgent, SessionEntry, SessionManager, StoredEvent};

//! Networking types shared by the server surface and its clients.

pub mod errors;
pub mod messages;

pub use errors::ProtocolError;
pub use messages::{ClientEvent, ServerEvent, TableSummary};

/// Parse one inbound JSON frame.
pub fn parse_client_frame(text: &str) -> Result<ClientEvent, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

//! Wire protocol for the app-server control channel
//!
//! This module provides frame classification, outgoing frame types, the
//! capability flags sent during the handshake, and the pending-request table
//! used to correlate responses with callers.
//!
//! # Example: Classifying frames
//!
//! ```rust
//! use kodegen_codex_bridge::control::IncomingMessage;
//! use serde_json::json;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let frame = json!({ "method": "turn/started", "params": { "turn": { "id": "t1" } } });
//! assert!(matches!(
//!     IncomingMessage::classify(frame)?,
//!     IncomingMessage::Notification { .. }
//! ));
//!
//! let frame = json!({ "id": 7, "result": {} });
//! assert!(matches!(
//!     IncomingMessage::classify(frame)?,
//!     IncomingMessage::Response { .. }
//! ));
//! # Ok(())
//! # }
//! ```

mod capabilities;
mod handler;
mod messages;

// Re-export public types
pub use capabilities::ClientCapabilities;
pub use handler::{PendingRequests, ResponseReceiver};
pub use messages::{IncomingMessage, OutgoingMessage, RpcErrorBody};

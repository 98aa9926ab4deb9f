//! Event normalization
//!
//! Pure, stateless helpers over raw notification payloads: identifier and
//! status extraction, method routing, and projection of built-in tool items
//! into a uniform call shape.

mod ids;
mod methods;
mod status;
mod tools;

pub use ids::{thread_id, turn_error, turn_id, turn_status};
pub use methods::{NotificationRoute, implied_failure_status, normalize_method, route};
pub use status::TurnStatus;
pub use tools::{ToolKind, ToolObservation, ToolSignal, call_id, observe_tool};

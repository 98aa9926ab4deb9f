//! Type definitions for the app-server bridge
//!
//! - [`identifiers`] - Type-safe ID wrappers (`RequestId`, `RunId`)
//! - [`options`] - Connection options, builder, and per-thread overrides
//! - [`input`] - Turn input items
//! - [`events`] - Events yielded by a turn stream
//! - [`dynamic_tools`] - Host-executed tool requests and responses

pub mod dynamic_tools;
pub mod events;
pub mod identifiers;
pub mod input;
pub mod options;

// Re-export commonly used types
pub use dynamic_tools::{
    ContentItem, DynamicToolCall, DynamicToolExecutor, DynamicToolResponse, DynamicToolSpec,
    dynamic_tool_executor,
};
pub use events::{ToolCall, TurnEvent, TurnSummary};
pub use identifiers::{RequestId, RunId};
pub use input::{InputItem, TurnInput};
pub use options::{ClientOptions, ClientOptionsBuilder, ThreadOptions};

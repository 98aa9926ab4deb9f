//! Host-executed ("dynamic") tool types
//!
//! The agent asks the host to run a tool through an inbound `item/tool/call`
//! request. The host answers with a success flag and ordered content items.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Tool advertised to the agent on `thread/start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicToolSpec {
    /// Tool name the agent will call
    pub name: String,
    /// Description shown to the model
    pub description: String,
    /// JSON Schema of the arguments
    pub input_schema: Value,
}

impl DynamicToolSpec {
    /// Create a tool spec
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Parameters of an inbound `item/tool/call` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicToolCall {
    /// Thread the call belongs to
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Turn the call belongs to
    #[serde(default)]
    pub turn_id: Option<String>,
    /// Call id, unique within the turn
    pub call_id: String,
    /// Tool name
    pub tool: String,
    /// Tool arguments
    #[serde(default)]
    pub arguments: Value,
}

/// One content item of a dynamic tool response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentItem {
    /// Plain text
    InputText {
        /// Text content
        text: String,
    },
    /// Image reference
    InputImage {
        /// Image URL or data URL
        #[serde(rename = "imageUrl")]
        image_url: String,
    },
}

/// Host answer to a dynamic tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicToolResponse {
    /// Whether the tool succeeded
    pub success: bool,
    /// Ordered output items
    pub content_items: Vec<ContentItem>,
}

impl DynamicToolResponse {
    /// Successful response with a single text item
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            success: true,
            content_items: vec![ContentItem::InputText { text: text.into() }],
        }
    }

    /// Failed response with a single text item explaining why
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            content_items: vec![ContentItem::InputText {
                text: message.into(),
            }],
        }
    }
}

/// Host-supplied executor for dynamic tool calls
pub type DynamicToolExecutor =
    Arc<dyn Fn(DynamicToolCall) -> BoxFuture<'static, Result<DynamicToolResponse>> + Send + Sync>;

/// Box an async closure as a [`DynamicToolExecutor`]
///
/// # Examples
/// ```
/// use kodegen_codex_bridge::{DynamicToolResponse, dynamic_tool_executor};
///
/// let executor = dynamic_tool_executor(|call| async move {
///     Ok(DynamicToolResponse::text(format!("ran {}", call.tool)))
/// });
/// # drop(executor);
/// ```
pub fn dynamic_tool_executor<F, Fut>(f: F) -> DynamicToolExecutor
where
    F: Fn(DynamicToolCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<DynamicToolResponse>> + Send + 'static,
{
    Arc::new(move |call| Box::pin(f(call)))
}

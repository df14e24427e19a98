use crate::types::ConversationMessage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// --- OPENAI-COMPATIBLE GATEWAY SCHEMA ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiRequest {
    pub model: String,
    pub messages: Vec<ConversationMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiTool {
    pub r#type: String,
    pub function: OpenAiFunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunctionDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: serde_json::Value,
}

/// One `data:` payload of a streamed completion. Only the fields the chat
/// client reads are modelled; everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamPulse {
    #[serde(default)]
    pub choices: Vec<PulseChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PulseChoice {
    #[serde(default)]
    pub delta: PulseDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PulseDelta {
    #[serde(default)]
    pub content: Option<String>,
}

impl StreamPulse {
    /// Content fragment carried by the first choice, if any.
    pub fn content_delta(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.delta.content)
    }
}

//! Tool definitions advertised to the upstream model.
//!
//! The relay never executes these; it only attaches them so the model can emit
//! tool calls, which flow back to the caller inside the piped event stream.

use crate::specs::openai::{OpenAiFunctionDefinition, OpenAiTool};
use serde_json::json;

fn address_tool(name: &str, description: &str) -> OpenAiTool {
    OpenAiTool {
        r#type: "function".to_string(),
        function: OpenAiFunctionDefinition {
            name: name.to_string(),
            description: Some(description.to_string()),
            parameters: json!({
                "type": "object",
                "properties": {
                    "user_address": {
                        "type": "string",
                        "description": "The user's wallet address",
                    },
                },
                "required": ["user_address"],
            }),
        },
    }
}

/// Tools attached to every relayed chat request.
pub fn agent_tools() -> Vec<OpenAiTool> {
    vec![
        address_tool(
            "check_spend_permission",
            "Check if the user has an active spend permission set up for the agent",
        ),
        address_tool(
            "get_portfolio_summary",
            "Get a summary of the user's portfolio including token balances",
        ),
    ]
}

/// Names of required parameters declared by a tool's JSON schema.
pub fn required_params(tool: &OpenAiTool) -> Vec<String> {
    tool.function
        .parameters
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

use crate::types::*;
use axum::{extract::rejection::JsonRejection, Json};
use serde::{Deserialize, Serialize};

/// Unwraps a `Json` extraction, turning axum's plain-text rejections
/// (bad syntax, wrong content type, wrong field types) into `InvalidIngress`.
pub fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => {
            tracing::warn!("[📱 -> ⚙️ ] Rejected body: {}", rejection.body_text());
            Err(AgentError::from(rejection).into())
        }
    }
}

/// Body of `POST /agent-chat`.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ConversationMessage>,
    #[serde(rename = "userAddress")]
    pub user_address: UserAddress,
}

impl ChatRequest {
    /// Parses and validates a raw JSON body.
    pub fn from_value(payload: serde_json::Value) -> Result<Self> {
        let req: ChatRequest = match serde_json::from_value(payload) {
            Ok(r) => r,
            Err(e) => {
                return Err(AgentError::InvalidIngress(format!(
                    "Payload deserialization failed: {}",
                    e
                ))
                .into())
            }
        };
        req.validate()?;
        Ok(req)
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_address.0.trim().is_empty() {
            return Err(AgentError::InvalidIngress("Missing user address".into()).into());
        }
        Ok(())
    }

    /// The trailing message, when the caller authored it. This is the turn the
    /// relay records in chat history.
    pub fn trailing_user_message(&self) -> Option<&ConversationMessage> {
        self.messages.last().filter(|m| m.role == Role::User)
    }
}

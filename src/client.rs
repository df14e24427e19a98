//! Streaming chat client: keeps the local conversation, sends it to the relay
//! and renders the assistant reply as it streams in.

use crate::constants::{GENERIC_ASSISTANT_ERROR, GREETING};
use crate::streaming::{AssistantDraft, DeltaDecoder, StreamEvent};
use crate::types::*;
use futures_util::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// One entry of the displayed conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub id: String,
    pub role: Role,
    pub content: String,
}

impl ChatEntry {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
        }
    }
}

/// Transient notices shown instead of an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    RateLimited,
    CreditsExhausted,
}

impl Notice {
    pub fn text(&self) -> &'static str {
        match self {
            Notice::RateLimited => "Rate limit exceeded. Please try again later.",
            Notice::CreditsExhausted => "AI credits exhausted. Please add credits to continue.",
        }
    }
}

/// Display surface driven by a [`ChatSession`].
pub trait ChatView {
    fn entry_added(&mut self, entry: &ChatEntry);
    /// Replaces the displayed content of an entry with `content`.
    fn entry_updated(&mut self, id: &str, content: &str);
    fn entry_removed(&mut self, id: &str);
    fn notice(&mut self, notice: Notice);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The stream ran to completion.
    Completed,
    RateLimited,
    CreditsExhausted,
    /// The request failed before streaming; the placeholder holds the generic error.
    Failed,
    /// The caller cancelled. A partial draft is kept; an empty one is removed.
    Cancelled,
    /// The body broke off mid-stream. A partial draft is kept; an empty one is removed.
    Interrupted,
    /// Blank input; nothing was sent.
    Ignored,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RelayPayload<'a> {
    messages: &'a [ConversationMessage],
    user_address: &'a UserAddress,
}

/// HTTP access to the relay's chat endpoint.
#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl RelayClient {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint, token)
    }

    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            token,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts the conversation and returns the response once the status is
    /// known to be a success.
    pub async fn open_stream(
        &self,
        messages: &[ConversationMessage],
        user_address: &UserAddress,
    ) -> Result<reqwest::Response> {
        let mut request = self.http.post(&self.endpoint).json(&RelayPayload {
            messages,
            user_address,
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!("[📱 -> ⚙️ ] Relay answered {}", status);
            return Err(crate::relay::classify_upstream_status(status).into());
        }
        Ok(response)
    }
}

/// A conversation with the relay. `send` takes `&mut self`, so one session has
/// at most one request in flight.
pub struct ChatSession {
    relay: RelayClient,
    user_address: UserAddress,
    history: Vec<ChatEntry>,
    sending: bool,
}

impl ChatSession {
    pub fn new(relay: RelayClient, user_address: UserAddress) -> Self {
        Self {
            relay,
            user_address,
            history: Vec::new(),
            sending: false,
        }
    }

    /// Starts the conversation with the assistant's greeting.
    pub fn with_greeting(relay: RelayClient, user_address: UserAddress) -> Self {
        let mut session = Self::new(relay, user_address);
        session.history.push(ChatEntry::new(Role::Assistant, GREETING));
        session
    }

    pub fn history(&self) -> &[ChatEntry] {
        &self.history
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// The history as sent upstream. Assistant entries that never received
    /// content, or that only show the generic error, are left out.
    fn conversation(&self) -> Vec<ConversationMessage> {
        self.history
            .iter()
            .filter(|e| {
                e.role != Role::Assistant
                    || !(e.content.is_empty() || e.content == GENERIC_ASSISTANT_ERROR)
            })
            .map(|e| ConversationMessage {
                role: e.role,
                content: e.content.clone(),
            })
            .collect()
    }

    fn update_entry(&mut self, id: &str, content: &str) {
        if let Some(entry) = self.history.iter_mut().find(|e| e.id == id) {
            entry.content = content.to_string();
        }
    }

    fn remove_entry(&mut self, id: &str) {
        self.history.retain(|e| e.id != id);
    }

    /// Ends an exchange that stopped early. A draft that received nothing is
    /// dropped; a partial one stays as it is.
    fn stop_early(
        &mut self,
        draft: &AssistantDraft,
        view: &mut impl ChatView,
        outcome: SendOutcome,
    ) -> SendOutcome {
        if draft.content().is_empty() {
            self.remove_entry(draft.id());
            view.entry_removed(draft.id());
        }
        outcome
    }

    /// Sends `text` as a new user turn and streams the reply into `view`.
    #[tracing::instrument(name = "client.send", skip_all, fields(user = %self.user_address.short()))]
    pub async fn send(
        &mut self,
        text: &str,
        view: &mut impl ChatView,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        if text.trim().is_empty() {
            return SendOutcome::Ignored;
        }
        self.sending = true;
        let outcome = self.exchange(text, view, cancel).await;
        self.sending = false;
        tracing::info!("[⚙️  -> 📱] Send finished: {:?}", outcome);
        outcome
    }

    async fn exchange(
        &mut self,
        text: &str,
        view: &mut impl ChatView,
        cancel: &CancellationToken,
    ) -> SendOutcome {
        let user_entry = ChatEntry::new(Role::User, text);
        view.entry_added(&user_entry);
        self.history.push(user_entry);
        let outgoing = self.conversation();

        let placeholder = ChatEntry::new(Role::Assistant, "");
        let mut draft = AssistantDraft::new(placeholder.id.clone());
        view.entry_added(&placeholder);
        self.history.push(placeholder);

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            r = self.relay.open_stream(&outgoing, &self.user_address) => Some(r),
        };
        let response = match opened {
            None => return self.stop_early(&draft, view, SendOutcome::Cancelled),
            Some(Ok(r)) => r,
            Some(Err(e)) => return self.reject(&draft, e.inner, view),
        };

        let mut decoder = DeltaDecoder::new();
        let mut body = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("[📱] Send cancelled after {} chars", draft.content().len());
                    return self.stop_early(&draft, view, SendOutcome::Cancelled);
                }
                chunk = body.next() => chunk,
            };

            let events = match next {
                Some(Ok(bytes)) => decoder.feed(&bytes),
                Some(Err(e)) => {
                    tracing::warn!("[⚙️  -> 📱] Stream broke off: {}", e);
                    return self.stop_early(&draft, view, SendOutcome::Interrupted);
                }
                None => {
                    let tail = decoder.finish();
                    self.apply(&mut draft, tail, view);
                    break;
                }
            };
            self.apply(&mut draft, events, view);
        }

        if decoder.dropped_frames() > 0 {
            tracing::warn!("[⚙️  -> 📱] {} frame(s) dropped", decoder.dropped_frames());
        }
        SendOutcome::Completed
    }

    fn apply(&mut self, draft: &mut AssistantDraft, events: Vec<StreamEvent>, view: &mut impl ChatView) {
        let mut changed = false;
        for event in events {
            if let StreamEvent::Delta(delta) = event {
                draft.append(&delta);
                changed = true;
            }
        }
        if changed {
            self.update_entry(draft.id(), draft.content());
            view.entry_updated(draft.id(), draft.content());
        }
    }

    fn reject(&mut self, draft: &AssistantDraft, error: AgentError, view: &mut impl ChatView) -> SendOutcome {
        tracing::error!("[⚙️  -> 📱] Chat request failed: {}", error);
        match error {
            AgentError::RateLimited => {
                self.remove_entry(draft.id());
                view.entry_removed(draft.id());
                view.notice(Notice::RateLimited);
                SendOutcome::RateLimited
            }
            AgentError::CreditsExhausted => {
                self.remove_entry(draft.id());
                view.entry_removed(draft.id());
                view.notice(Notice::CreditsExhausted);
                SendOutcome::CreditsExhausted
            }
            _ => {
                self.update_entry(draft.id(), GENERIC_ASSISTANT_ERROR);
                view.entry_updated(draft.id(), GENERIC_ASSISTANT_ERROR);
                SendOutcome::Failed
            }
        }
    }
}

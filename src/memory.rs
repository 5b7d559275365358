//! Conversation memory.
//!
//! A [`ConversationStore`] maps session identifiers to their message
//! history. It is owned by the session loop and passed down by `&mut`, so
//! only the active turn can touch it and the append after a model reply is
//! a single uninterrupted update.
//!
//! Histories are append-only and never pruned.

use anyhow::Result;
use std::collections::HashMap;

use crate::error::ContractError;
use crate::model::ModelGateway;
use crate::models::{ChatMessage, SessionId};
use crate::prompts::ASK_SYSTEM_PROMPT;

/// Ordered messages of one session.
#[derive(Debug, Default, Clone)]
pub struct History {
    messages: Vec<ChatMessage>,
}

impl History {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
    }
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    histories: HashMap<SessionId, History>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the session's history, creating an empty one on first access.
    pub fn get_or_create(&mut self, session: &SessionId) -> &mut History {
        self.histories.entry(session.clone()).or_default()
    }

    /// Read-only lookup that never creates a history.
    pub fn get(&self, session: &SessionId) -> Option<&History> {
        self.histories.get(session)
    }

    pub fn append(&mut self, session: &SessionId, messages: impl IntoIterator<Item = ChatMessage>) {
        self.get_or_create(session).extend(messages);
    }

    pub fn session_count(&self) -> usize {
        self.histories.len()
    }

    /// Run one conversational turn.
    ///
    /// The model sees `[system, ..history, ..input]`. Once it answers, the
    /// input messages and the reply are appended together. A failed model
    /// call leaves the history untouched.
    pub async fn run_turn(
        &mut self,
        gateway: &ModelGateway,
        session: Option<&SessionId>,
        input: Vec<ChatMessage>,
    ) -> Result<ChatMessage> {
        let session = session.ok_or(ContractError::MissingSessionId)?;

        let history = self.get_or_create(session);
        let mut request = Vec::with_capacity(history.len() + input.len() + 1);
        request.push(ChatMessage::system(ASK_SYSTEM_PROMPT));
        request.extend(history.messages().iter().cloned());
        request.extend(input.iter().cloned());

        let reply = gateway.complete(&request).await?;

        self.append(session, input.into_iter().chain(std::iter::once(reply.clone())));
        Ok(reply)
    }
}

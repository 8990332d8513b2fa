use anyhow::{bail, Context, Result};
use futures_util::StreamExt;

use palms_api::{ChatClient, StreamSink};
use palms_logging::ConversationLogger;
use palms_types::{ChatMessage, StreamEvent, StreamOutcome};

use crate::session::SessionState;

/// Ties the streaming client to the session state: each exchange is recorded
/// in the history according to how the stream ended.
pub struct Conversation {
    client: ChatClient,
    session: SessionState,
    model_override: Option<String>,
    logger: Option<ConversationLogger>,
}

impl Conversation {
    pub fn new(client: ChatClient, session: SessionState) -> Self {
        Self {
            client,
            session,
            model_override: None,
            logger: None,
        }
    }

    /// Use `model` for this conversation without changing the saved selection
    pub fn with_model_override(mut self, model: Option<String>) -> Self {
        self.model_override = model.filter(|m| !m.trim().is_empty());
        self
    }

    /// Model the next message is sent with
    pub fn model(&self) -> &str {
        self.model_override.as_deref().unwrap_or_else(|| self.session.model())
    }

    /// Select and save `model`; this also drops any per-run override
    pub fn select_model(&mut self, model: &str) -> Result<()> {
        self.session
            .set_model(model)
            .with_context(|| format!("Failed to save model selection '{}'", model))?;
        self.model_override = None;
        Ok(())
    }

    /// Also record every exchange in a JSONL conversation log
    pub fn with_logger(mut self, logger: ConversationLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    /// A clone of the client that can cancel the in-flight send from
    /// another task
    pub fn cancel_handle(&self) -> ChatClient {
        self.client.clone()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    /// Send `message` with the current [`model`](Self::model) and stream the reply into
    /// `sink`.
    ///
    /// A blank message does nothing and returns `Ok(None)`. Otherwise the
    /// user message is stored as the send starts; the reply is stored when it
    /// completed or was cancelled with some text, never when it errored.
    pub async fn send<S>(&mut self, message: &str, sink: &mut S) -> Result<Option<StreamOutcome>>
    where
        S: StreamSink + ?Sized,
    {
        let message = message.trim();
        let session_id = self.session.session_id().to_string();
        let model = self.model().to_string();

        let Some(mut stream) = self.client.send(&session_id, message, &model)? else {
            return Ok(None);
        };

        self.session
            .append(ChatMessage::user(message))
            .context("Failed to save the user message")?;
        if let Some(logger) = &mut self.logger {
            logger.log_user(&session_id, message, &model).await;
        }

        let mut outcome = None;
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Delta(delta) => sink.on_delta(&delta),
                StreamEvent::Finished(finished) => {
                    outcome = Some(finished);
                    break;
                }
            }
        }
        drop(stream);

        let Some(outcome) = outcome else {
            bail!("chat stream ended without an outcome");
        };

        sink.on_finish(&outcome);

        if outcome.should_persist() {
            self.session
                .append(ChatMessage::bot(outcome.text()))
                .context("Failed to save the reply")?;
        } else if let Some(message) = outcome.error_message() {
            log::debug!("reply not saved: {}", message);
        }

        if let Some(logger) = &mut self.logger {
            logger.log_outcome(&session_id, &outcome, &model).await;
        }

        Ok(Some(outcome))
    }

    /// Flush the conversation log, if any
    pub async fn shutdown(&mut self) {
        if let Some(logger) = &mut self.logger {
            logger.shutdown().await;
        }
    }
}

//! # Dialog Session Management
//!
//! Runs practice conversations. Each session owns a `ConversationContext`
//! behind its own `tokio::sync::Mutex`, so two sessions never wait on each
//! other while a single session's turns stay strictly ordered.
//!
//! ## Turn Sequence (under the session lock):
//! 1. Append the user message (window enforced)
//! 2. Send the transcript to the text generator
//! 3. Append the reply (window enforced)
//! 4. Vocalize the reply through the artifact store

use super::context::{ConversationContext, Role};
use super::DialogError;
use crate::adapters::{GenerationRequest, TextGenerator};
use crate::audio::{AudioArtifact, AudioArtifactStore};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct DialogSettings {
    pub model: String,
    pub max_turns: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct TalkReply {
    pub message: String,
    pub audio: AudioArtifact,
    pub session_id: String,
}

type SharedContext = Arc<Mutex<ConversationContext>>;

pub struct DialogManager {
    generator: Arc<dyn TextGenerator>,
    artifacts: Arc<AudioArtifactStore>,
    settings: DialogSettings,
    sessions: RwLock<HashMap<String, SharedContext>>,
}

impl DialogManager {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        artifacts: Arc<AudioArtifactStore>,
        settings: DialogSettings,
    ) -> Self {
        Self {
            generator,
            artifacts,
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start an empty context with this manager's window size.
    pub fn new_context(&self, topic: &str, language: &str) -> ConversationContext {
        ConversationContext::new(topic, language, self.settings.max_turns)
    }

    /// Append the user message, ask the model for a reply and append it.
    pub async fn advance(
        &self,
        context: &mut ConversationContext,
        user_message: &str,
    ) -> Result<String, DialogError> {
        let user_message = user_message.trim();
        if user_message.is_empty() {
            return Err(DialogError::EmptyMessage);
        }

        context.push(Role::User, user_message);

        let request = GenerationRequest::new(&self.settings.model, build_prompt(context))
            .with_system(system_instruction(&context.language))
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature);

        let reply = self.generator.generate(request).await?;
        context.push(Role::Assistant, reply.clone());

        debug!(turns = context.len(), reply_len = reply.len(), "Dialog advanced");
        Ok(reply)
    }

    /// One full practice turn for a session, creating the session on first use.
    #[instrument(skip(self, message), fields(session = ?session_id, language = %language, topic = %topic))]
    pub async fn talk(
        &self,
        session_id: Option<&str>,
        message: &str,
        language: &str,
        topic: &str,
    ) -> Result<TalkReply, DialogError> {
        let session_id = match session_id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        let mut context = self.checkout(&session_id, topic, language).await;

        context.topic = topic.to_string();
        context.language = language.to_string();

        let reply = self.advance(&mut context, message).await?;
        let audio = self.artifacts.synthesize(&reply).await?;

        Ok(TalkReply { message: reply, audio, session_id })
    }

    /// Lock the context registered for `session_id`.
    ///
    /// A sweep can unregister the context between lookup and lock; the lock is
    /// only returned once the context is confirmed to still be registered.
    async fn checkout(&self, session_id: &str, topic: &str, language: &str) -> OwnedMutexGuard<ConversationContext> {
        let mut context = self.session(session_id, topic, language).await;
        loop {
            let guard = context.clone().lock_owned().await;
            let registered = self
                .sessions
                .read()
                .await
                .get(session_id)
                .is_some_and(|current| Arc::ptr_eq(current, &context));
            if registered {
                return guard;
            }

            drop(guard);
            debug!(session = %session_id, "Conversation was pruned while waiting, starting over");
            context = self.session(session_id, topic, language).await;
        }
    }

    async fn session(&self, session_id: &str, topic: &str, language: &str) -> SharedContext {
        if let Some(context) = self.sessions.read().await.get(session_id) {
            return context.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!(session = %session_id, "Starting new conversation");
                Arc::new(Mutex::new(self.new_context(topic, language)))
            })
            .clone()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle for longer than the configured timeout.
    /// Sessions currently mid-turn are always kept.
    pub async fn prune_idle(&self) -> usize {
        let idle_timeout = self.settings.idle_timeout;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, context| match context.try_lock() {
            Ok(context) => context.last_active().elapsed() < idle_timeout,
            Err(_) => true,
        });

        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, remaining = sessions.len(), "Pruned idle conversations");
        }
        removed
    }
}

fn system_instruction(language: &str) -> String {
    format!(
        "You are a friendly conversation partner helping a learner practice {language}. \
         Always answer in {language}, keep replies short and use simple vocabulary."
    )
}

fn build_prompt(context: &ConversationContext) -> String {
    format!(
        "Practice conversation in {language} about the topic: {topic}.\n\
         Use sentence structures a language learner can follow and keep the conversation going.\n\n\
         Conversation so far:\n{transcript}\n\n\
         Reply to the user's last message, staying on the topic {topic}.",
        language = context.language,
        topic = context.topic,
        transcript = context.transcript(),
    )
}

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::history::{load_conversation_history, save_conversation_history};
use crate::message::{Message, MessageRole};
use crate::model_gateway::{ChatGateway, ChatRequest};
use crate::prompt::PromptConfig;

/// A conversation bound to an optional history file. Every turn sends the
/// full transcript and, when a file is set, persists it afterwards.
pub struct ChatSession<'a, G: ?Sized> {
    gateway: &'a G,
    history_path: Option<PathBuf>,
    history: Vec<Message>,
}

impl<'a, G> ChatSession<'a, G>
where
    G: ChatGateway + ?Sized,
{
    /// Loads the prior transcript, if any.
    pub fn open(gateway: &'a G, history_path: Option<PathBuf>) -> Result<Self> {
        let history = match history_path.as_deref() {
            Some(path) => load_conversation_history(path)
                .with_context(|| format!("failed to load history {}", path.display()))?,
            None => Vec::new(),
        };
        debug!(
            history_len = history.len(),
            history_path = ?history_path,
            "opened chat session"
        );

        Ok(Self {
            gateway,
            history_path,
            history,
        })
    }

    /// Sends one turn and returns the reply text. A system message is only
    /// kept when the conversation is fresh. On failure the transcript is left
    /// as it was before the turn.
    pub async fn run_turn(&mut self, prompt: &PromptConfig, messages: Vec<Message>) -> Result<String> {
        let checkpoint = self.history.len();
        let fresh = self.history.is_empty();
        self.history.extend(
            messages
                .into_iter()
                .filter(|message| fresh || message.role != MessageRole::System),
        );

        if !prompt.tools.is_empty() {
            debug!(tools = ?prompt.tools, "tools requested");
        }

        let mut request = ChatRequest::new(prompt.model.clone(), self.history.clone());
        request.max_tokens = prompt.max_tokens;

        let reply = match self.gateway.chat(request).await {
            Ok(reply) => reply,
            Err(err) => {
                self.history.truncate(checkpoint);
                return Err(err).context("chat completion failed");
            }
        };
        self.history.push(Message::assistant(reply.content.clone()));

        if let Some(path) = &self.history_path {
            save_conversation_history(path, &self.history)
                .with_context(|| format!("failed to save history {}", path.display()))?;
            info!(
                history_path = %path.display(),
                message_count = self.history.len(),
                "saved conversation history"
            );
        }
        Ok(reply.content)
    }
}

#[cfg(test)]
mod tests {
    use super::ChatSession;
    use crate::history::{load_conversation_history, save_conversation_history};
    use crate::message::{Message, MessageRole};
    use crate::model_gateway::testing::StubGateway;
    use crate::prompt::PromptConfig;

    fn prompt() -> PromptConfig {
        PromptConfig {
            model: "gpt-4o-mini".to_string(),
            max_tokens: Some(128),
            ..PromptConfig::default()
        }
    }

    #[tokio::test]
    async fn run_turn_sends_messages_and_saves_history() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("chat");
        let gateway = StubGateway::ok("pong");

        let mut session = ChatSession::open(&gateway, Some(path.clone())).expect("open");
        let reply = session
            .run_turn(
                &prompt(),
                vec![Message::system("be terse"), Message::user("ping")],
            )
            .await
            .expect("turn should succeed");
        assert_eq!(reply, "pong");

        let calls = gateway.calls.borrow();
        assert_eq!(calls[0].model, "gpt-4o-mini");
        assert_eq!(calls[0].max_tokens, Some(128));
        assert_eq!(calls[0].messages.len(), 2);

        let saved = load_conversation_history(&path).expect("history should load");
        let roles: Vec<MessageRole> = saved.iter().map(|message| message.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::System, MessageRole::User, MessageRole::Assistant]
        );
        assert_eq!(saved[2].display_content(), "pong");
    }

    #[tokio::test]
    async fn continued_conversation_skips_new_system_message() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("chat.json");
        save_conversation_history(
            &path,
            &[
                Message::system("be terse"),
                Message::user("first"),
                Message::assistant("one"),
            ],
        )
        .expect("seed history");
        let gateway = StubGateway::ok("two");

        let mut session = ChatSession::open(&gateway, Some(path.clone())).expect("open");
        session
            .run_turn(
                &prompt(),
                vec![Message::system("be terse"), Message::user("second")],
            )
            .await
            .expect("turn should succeed");

        let sent = &gateway.calls.borrow()[0].messages;
        assert_eq!(sent.len(), 4);
        assert_eq!(
            sent.iter()
                .filter(|message| message.role == MessageRole::System)
                .count(),
            1
        );
        assert_eq!(load_conversation_history(&path).expect("load").len(), 5);
    }

    #[tokio::test]
    async fn failed_turn_leaves_history_untouched() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("chat.json");
        let gateway = StubGateway::empty();

        let mut session = ChatSession::open(&gateway, Some(path.clone())).expect("open");
        let err = session
            .run_turn(&prompt(), vec![Message::user("hello")])
            .await
            .expect_err("empty response should fail");
        assert!(format!("{err:#}").contains("no choices"), "got {err:#}");
        assert!(session.history.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn session_without_history_file_keeps_turns_in_memory() {
        let gateway = StubGateway::ok("reply");
        let mut session = ChatSession::open(&gateway, None).expect("open");

        session
            .run_turn(&prompt(), vec![Message::user("a")])
            .await
            .expect("first turn");
        session
            .run_turn(&prompt(), vec![Message::user("b")])
            .await
            .expect("second turn");

        assert_eq!(session.history.len(), 4);
        assert_eq!(gateway.calls.borrow()[1].messages.len(), 3);
    }
}

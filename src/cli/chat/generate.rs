//! Response generation: prompt composition and the fail-soft boundary.
//!
//! The composed prompt carries the persona, the ambient session context,
//! the full prior transcript and, when a web digest is available, an
//! instruction block telling the model to lean on it. Transport failures
//! never leave this module as errors; they become a visible diagnostic
//! reply so the orchestrator can append something and the turn completes.

use regex::Regex;

use super::context::{ContextManager, PERSONA};
use super::conversation_state::Message;
use super::error::GenerationError;
use crate::ollama_client::GenerationBackend;

/// Diagnostic reply when the backend cannot be reached at all.
pub const UNREACHABLE_REPLY: &str = "Could not connect to Ollama. Is it running?";

/// Compose the full prompt for one generation call.
pub fn build_prompt(
    context: &ContextManager,
    history: &[Message],
    user_text: &str,
    digest: Option<&str>,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(PERSONA);
    prompt.push_str("\n\n");
    prompt.push_str(&context.system_context());
    prompt.push_str("\n\n");

    if !history.is_empty() {
        prompt.push_str("Conversation so far:\n");
        for message in history {
            prompt.push_str(message.role.as_str());
            prompt.push_str(": ");
            prompt.push_str(&message.content);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    if let Some(digest) = digest.filter(|d| !d.is_empty()) {
        prompt.push_str(
            "Use the following up-to-date web results when answering. \
Format any link you mention as [title](url).\n",
        );
        prompt.push_str(digest);
        prompt.push_str("\n\n");
    }

    prompt.push_str("user: ");
    prompt.push_str(user_text);
    prompt
}

/// Drop a leading `assistant:` echo some models prepend to the completion.
pub fn strip_role_prefix(text: &str) -> String {
    let prefix = Regex::new(r"(?i)^\s*assistant\s*[:：]\s*").expect("prefix pattern is valid");
    prefix.replace(text, "").to_string()
}

/// Run one generation call, degrading any failure to a diagnostic reply.
pub async fn generate(
    backend: &dyn GenerationBackend,
    context: &ContextManager,
    history: &[Message],
    user_text: &str,
    digest: Option<&str>,
) -> String {
    let prompt = build_prompt(context, history, user_text, digest);

    match backend.complete(&prompt).await {
        Ok(text) => strip_role_prefix(&text),
        Err(e) => {
            tracing::error!(error = %e, "generation failed");
            match e {
                GenerationError::Connect(_) => UNREACHABLE_REPLY.to_string(),
                other => format!("Ollama request error: {other}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::chat::conversation_state::ConversationState;
    use crate::cli::chat::error::GenerationError;
    use async_trait::async_trait;

    struct FixedBackend(Result<&'static str, fn() -> GenerationError>);

    #[async_trait]
    impl GenerationBackend for FixedBackend {
        async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
            match &self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(make) => Err(make()),
            }
        }
    }

    fn context() -> ContextManager {
        ContextManager::new("Athens, Greece".to_string())
    }

    #[test]
    fn prompt_carries_persona_history_and_user_text() {
        let mut state = ConversationState::new();
        state.add_user_message("hi", false);
        state.add_assistant_message("hello!");

        let prompt = build_prompt(&context(), state.messages(), "what's new?", None);
        assert!(prompt.starts_with(PERSONA));
        assert!(prompt.contains("user: hi\n"));
        assert!(prompt.contains("assistant: hello!\n"));
        assert!(prompt.ends_with("user: what's new?"));
    }

    #[test]
    fn digest_block_is_included_when_present() {
        let prompt = build_prompt(&context(), &[], "weather?", Some("- sunny all week"));
        assert!(prompt.contains("up-to-date web results"));
        assert!(prompt.contains("- sunny all week"));
    }

    #[test]
    fn empty_digest_adds_no_instruction_block() {
        let prompt = build_prompt(&context(), &[], "weather?", Some(""));
        assert!(!prompt.contains("up-to-date web results"));
    }

    #[test]
    fn strips_leading_assistant_echo() {
        assert_eq!(strip_role_prefix("Assistant: sure thing"), "sure thing");
        assert_eq!(strip_role_prefix("  assistant : ok"), "ok");
        assert_eq!(strip_role_prefix("no prefix here"), "no prefix here");
        assert_eq!(
            strip_role_prefix("ask the assistant: later"),
            "ask the assistant: later"
        );
    }

    #[tokio::test]
    async fn connect_failure_becomes_diagnostic_reply() {
        let backend = FixedBackend(Err(|| GenerationError::Connect("refused".into())));
        let reply = generate(&backend, &context(), &[], "hello", None).await;
        assert_eq!(reply, UNREACHABLE_REPLY);
    }

    #[tokio::test]
    async fn successful_reply_is_prefix_stripped() {
        let backend = FixedBackend(Ok("assistant: hi!"));
        let reply = generate(&backend, &context(), &[], "hello", None).await;
        assert_eq!(reply, "hi!");
    }
}

//! LLM Provider trait: the abstraction the response loop drives.
//!
//! Every LLM backend (OpenAI, Anthropic, DeepSeek, Groq, …) implements this trait.
//! The `HttpProvider` in `http_provider.rs` covers all OpenAI-compatible APIs.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use toolwire_core::types::{LlmResponse, Message, ToolCall, ToolDefinition};

/// Configuration passed to each LLM call.
#[derive(Clone, Debug)]
pub struct LlmRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

/// One unit of streamed model output.
#[derive(Clone, Debug, PartialEq)]
pub enum Fragment {
    /// User-visible text, forwarded as soon as it arrives.
    Text(String),
    /// A complete request to invoke a capability.
    ToolCall(ToolCall),
    /// The model finished this round. Always the last fragment.
    Done { finish_reason: Option<String> },
}

/// Lazily produced model output for one round.
pub type FragmentStream<'a> = Pin<Box<dyn Stream<Item = Fragment> + Send + 'a>>;

/// Trait that all LLM providers must implement.
///
/// The main implementation is `HttpProvider` which handles any OpenAI-compatible API.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// # Arguments
    /// * `messages`: Conversation history in OpenAI format.
    /// * `tools`: Optional list of tool definitions the LLM can call.
    /// * `model`: Model identifier (e.g. `"claude-sonnet-4-20250514"`, `"gpt-4o"`).
    /// * `config`: Temperature, max_tokens, etc.
    ///
    /// # Returns
    /// An `LlmResponse` with content and/or tool calls.
    /// On API errors, returns `LlmResponse::error(...)` instead of propagating.
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> LlmResponse;

    /// Stream a chat completion as [`Fragment`]s.
    ///
    /// The default runs [`chat`](Self::chat) and replays the complete response,
    /// so providers without native streaming still work with the loop.
    fn chat_stream<'a>(
        &'a self,
        messages: &'a [Message],
        tools: Option<&'a [ToolDefinition]>,
        model: &'a str,
        config: &'a LlmRequestConfig,
    ) -> FragmentStream<'a> {
        Box::pin(
            stream::once(self.chat(messages, tools, model, config))
                .flat_map(|response| stream::iter(response_fragments(response))),
        )
    }

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}

/// Split a complete response into the fragments a stream would have produced.
pub fn response_fragments(response: LlmResponse) -> Vec<Fragment> {
    let mut fragments = Vec::with_capacity(response.tool_calls.len() + 2);
    if let Some(text) = response.content.filter(|t| !t.is_empty()) {
        fragments.push(Fragment::Text(text));
    }
    fragments.extend(response.tool_calls.into_iter().map(Fragment::ToolCall));
    fragments.push(Fragment::Done {
        finish_reason: response.finish_reason,
    });
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned;

    #[async_trait]
    impl LlmProvider for Canned {
        async fn chat(
            &self,
            _messages: &[Message],
            _tools: Option<&[ToolDefinition]>,
            _model: &str,
            _config: &LlmRequestConfig,
        ) -> LlmResponse {
            LlmResponse {
                content: Some("Looking that up.".into()),
                tool_calls: vec![ToolCall::new("call_1", "get_repository_stars", "{}")],
                finish_reason: Some("tool_calls".into()),
            }
        }

        fn default_model(&self) -> &str {
            "canned"
        }

        fn display_name(&self) -> &str {
            "Canned"
        }
    }

    #[tokio::test]
    async fn test_default_stream_replays_chat() {
        let messages = vec![Message::user("stars?")];
        let config = LlmRequestConfig::default();
        let fragments: Vec<Fragment> = Canned
            .chat_stream(&messages, None, "canned", &config)
            .collect()
            .await;

        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0], Fragment::Text("Looking that up.".into()));
        assert!(matches!(fragments[1], Fragment::ToolCall(ref c) if c.id == "call_1"));
        assert_eq!(
            fragments[2],
            Fragment::Done {
                finish_reason: Some("tool_calls".into())
            }
        );
    }

    #[test]
    fn test_empty_content_is_not_a_fragment() {
        let fragments = response_fragments(LlmResponse {
            content: Some(String::new()),
            ..Default::default()
        });
        assert_eq!(fragments, vec![Fragment::Done { finish_reason: None }]);
    }
}

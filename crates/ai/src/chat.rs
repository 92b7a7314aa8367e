use anyhow::anyhow;
use async_openai::{
  Client,
  config::OpenAIConfig,
  types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
  },
};
use async_trait::async_trait;
use mnema_shared::{APP_ENV, AppError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
  System,
  User,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
  pub role: ChatRole,
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self {
      role: ChatRole::System,
      content: content.into(),
    }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self {
      role: ChatRole::User,
      content: content.into(),
    }
  }
}

/// Narrow LLM capability: a list of messages in, plain text out.
///
/// Callers own all prompt construction and output parsing; failures at
/// this seam are ordinary `AppError`s that callers downgrade per their
/// own policy.
#[async_trait]
pub trait ChatModel: Send + Sync {
  async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AppError>;
}

/// OpenAI-compatible chat completion client.
pub struct OpenAiChat;

impl OpenAiChat {
  #[must_use]
  pub const fn new() -> Self {
    Self
  }
}

impl Default for OpenAiChat {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl ChatModel for OpenAiChat {
  async fn complete(&self, messages: &[ChatMessage]) -> Result<String, AppError> {
    let config = OpenAIConfig::new()
      .with_api_key(&APP_ENV.openai_api_key)
      .with_api_base(&APP_ENV.openai_base_url);

    let client = Client::with_config(config);

    let request_messages: Vec<ChatCompletionRequestMessage> = messages
      .iter()
      .map(|m| match m.role {
        ChatRole::System => ChatCompletionRequestMessage::System(
          ChatCompletionRequestSystemMessage::from(m.content.as_str()),
        ),
        ChatRole::User => ChatCompletionRequestMessage::User(
          ChatCompletionRequestUserMessage::from(m.content.as_str()),
        ),
      })
      .collect();

    let request = CreateChatCompletionRequestArgs::default()
      .model(&APP_ENV.openai_chat_model)
      .messages(request_messages)
      .build()?;

    let response = client
      .chat()
      .create(request)
      .await
      .map(|r| r.choices.into_iter())?
      .find_map(|c| c.message.content)
      .ok_or_else(|| anyhow!("empty message content"))?;

    Ok(response)
  }
}

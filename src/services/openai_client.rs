use anyhow::{anyhow, Context};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;

/// A prompt in, free-form text out. Callers must treat the text as untrusted.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str, system: Option<&str>) -> anyhow::Result<String>;
}

pub struct OpenaiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenaiClient {
    pub fn new(api_key: String, model: &str) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        OpenaiClient {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenaiClient {
    async fn complete(&self, prompt: &str, system: Option<&str>) -> anyhow::Result<String> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![];
        if let Some(system) = system {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?
                    .into(),
            );
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into(),
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .max_tokens(1000_u32)
            .build()?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("Openai chat completion failed")?;
        log::debug!("Response: {:?}", response);

        response
            .choices
            .first()
            .ok_or(anyhow!("No choices in Openai response"))?
            .message
            .content
            .clone()
            .ok_or(anyhow!("No content"))
    }
}

use std::sync::Arc;
use std::time::Duration;

use crate::api::provider::{ChatCompletionsProvider, Provider, ReplyMode};
use crate::core::config::Config;
use crate::core::persona;

/// Per-process server context. Effectively read-only: persona and
/// knowledge are loaded once at startup and treated as immutable
/// configuration, so concurrent requests share it freely.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn Provider>,
    pub persona_template: Arc<str>,
    pub knowledge: Arc<str>,
    pub mode: ReplyMode,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let template = persona::resolve(config.persona.as_deref())?;
        let knowledge = config.load_knowledge();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs()))
            .build()?;
        let provider = ChatCompletionsProvider::new(
            client,
            config.provider_base_url(),
            config.model(),
            crate::core::config::API_KEY_ENV,
            config.temperature(),
            config.max_tokens(),
        );

        Ok(Self {
            provider: Arc::new(provider),
            persona_template: Arc::from(template.template),
            knowledge: Arc::from(knowledge.as_str()),
            mode: config.reply_mode(),
        })
    }

    #[cfg(test)]
    pub fn for_tests(provider: Arc<dyn Provider>, mode: ReplyMode) -> Self {
        Self {
            provider,
            persona_template: Arc::from(
                "测试模板\n{{knowledge}}\n{{files}}\n{{history}}\n用户问题：{{message}}",
            ),
            knowledge: Arc::from(""),
            mode,
        }
    }
}

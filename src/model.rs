use crate::config::Config;
use crate::network;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("language model API key is not configured")]
    MissingCredential,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("model service answered with status {0}")]
    Status(u16),
    #[error("malformed model response: {0}")]
    Malformed(String),
}

impl ModelError {
    /// Configuration problems won't fix themselves on a second attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::MissingCredential => false,
            ModelError::Status(code) => *code == 429 || *code >= 500,
            ModelError::Transport(_) | ModelError::Malformed(_) => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider for a JSON object response.
    pub json: bool,
}

impl CompletionRequest {
    pub fn new(system: &str, prompt: String) -> Self {
        CompletionRequest {
            system: system.to_string(),
            prompt,
            temperature: 0.2,
            max_tokens: 500,
            json: false,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// External text-generation collaborator.
#[async_trait(?Send)]
pub trait LanguageModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError>;

    fn is_configured(&self) -> bool {
        true
    }
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiModel {
    api_key: Option<String>,
    api_base: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiModel {
    pub fn from_config(config: &Config) -> Self {
        OpenAiModel {
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    fn body(&self, request: &CompletionRequest) -> String {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if request.json {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body.to_string()
    }
}

pub(crate) fn extract_content(raw: &str) -> Result<String, ModelError> {
    let parsed: ChatResponse =
        serde_json::from_str(raw).map_err(|e| ModelError::Malformed(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ModelError::Malformed("no completion content".into()))
}

#[async_trait(?Send)]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
        let key = self.api_key.as_deref().ok_or(ModelError::MissingCredential)?;
        let url = format!("{}/chat/completions", self.api_base);
        let auth = format!("Bearer {}", key);
        let resp = network::post_json(&url, &[("Authorization", auth.as_str())], &self.body(request))
            .await
            .map_err(ModelError::Transport)?;
        if !resp.is_success() {
            return Err(ModelError::Status(resp.status));
        }
        extract_content(&resp.body)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    /// Model double: replays queued answers, then repeats a default or fails.
    pub struct ScriptedModel {
        queue: RefCell<VecDeque<Result<String, ModelError>>>,
        repeat: Option<String>,
        configured: bool,
        pub calls: Cell<usize>,
        pub requests: RefCell<Vec<CompletionRequest>>,
    }

    impl ScriptedModel {
        pub fn always(text: &str) -> Self {
            ScriptedModel {
                queue: RefCell::new(VecDeque::new()),
                repeat: Some(text.to_string()),
                configured: true,
                calls: Cell::new(0),
                requests: RefCell::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            ScriptedModel {
                repeat: None,
                ..ScriptedModel::always("")
            }
        }

        pub fn unconfigured() -> Self {
            ScriptedModel {
                configured: false,
                ..ScriptedModel::failing()
            }
        }

        pub fn sequence(answers: Vec<Result<String, ModelError>>) -> Self {
            let model = ScriptedModel::failing();
            model.queue.borrow_mut().extend(answers);
            model
        }
    }

    #[async_trait(?Send)]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, ModelError> {
            self.calls.set(self.calls.get() + 1);
            self.requests.borrow_mut().push(request.clone());
            if !self.configured {
                return Err(ModelError::MissingCredential);
            }
            if let Some(next) = self.queue.borrow_mut().pop_front() {
                return next;
            }
            self.repeat
                .clone()
                .ok_or_else(|| ModelError::Transport("offline".into()))
        }

        fn is_configured(&self) -> bool {
            self.configured
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_missing_key_short_circuits() {
        let model = OpenAiModel::from_config(&Config::default());
        assert!(!model.is_configured());
        let err = block_on(model.complete(&CompletionRequest::new("sys", "hi".into()))).unwrap_err();
        assert!(matches!(err, ModelError::MissingCredential));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_request_body() {
        let cfg = Config {
            api_key: Some("k".into()),
            ..Config::default()
        };
        let model = OpenAiModel::from_config(&cfg);
        let body = model.body(&CompletionRequest::new("be nice", "hello".into()).json());
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["model"], cfg.model.as_str());
        assert_eq!(v["messages"][0]["content"], "be nice");
        assert_eq!(v["messages"][1]["content"], "hello");
        assert_eq!(v["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_extract_content() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"ls -la"}}]}"#;
        assert_eq!(extract_content(raw).unwrap(), "ls -la");
        assert!(extract_content(r#"{"choices":[]}"#).is_err());
        assert!(extract_content("not json").is_err());
    }

    #[test]
    fn test_retry_classification() {
        assert!(ModelError::Status(503).is_retryable());
        assert!(ModelError::Status(429).is_retryable());
        assert!(!ModelError::Status(401).is_retryable());
        assert!(ModelError::Transport("reset".into()).is_retryable());
    }
}

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use tokio::runtime::Runtime;
use tracing::debug;

pub const CONTEXT_START: &str = "=== CONTEXT START ===";
pub const CONTEXT_END: &str = "=== CONTEXT END ===";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAi,
    Deepseek,
    Local,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Deepseek => "deepseek",
            LlmProvider::Local => "local",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "openai" => Some(LlmProvider::OpenAi),
            "deepseek" => Some(LlmProvider::Deepseek),
            "local" => Some(LlmProvider::Local),
            _ => None,
        }
    }

    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            LlmProvider::OpenAi => Some("OPENAI_API_KEY"),
            LlmProvider::Deepseek => Some("DEEPSEEK_API_KEY"),
            LlmProvider::Local => None,
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::Deepseek => "https://api.deepseek.com/v1",
            LlmProvider::Local => "",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Declarative description of a callable function offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionReply {
    Call { name: String, arguments: Value },
    Text(String),
}

/// Blocking chat surface used by the query pipeline. Tests substitute scripted fakes.
pub trait ChatBackend {
    fn complete(&self, req: &LlmRequest) -> Result<LlmResponse>;
    fn select_function(&self, req: &LlmRequest, functions: &[FunctionSpec])
        -> Result<FunctionReply>;
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    provider: LlmProvider,
    model: String,
    config: ProviderConfig,
}

#[derive(Clone)]
enum ProviderConfig {
    Remote(RemoteConfig),
    Local,
}

#[derive(Clone)]
struct RemoteConfig {
    api_key: String,
    base_url: String,
}

impl LlmClient {
    /// Reads the provider's API key (and `OPENAI_BASE_URL` for OpenAI) from the environment.
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Result<Self> {
        let api_key = match provider.api_key_var() {
            Some(var) => Some(read_api_key(var)?),
            None => None,
        };
        let base_url = match provider {
            LlmProvider::OpenAi => env::var("OPENAI_BASE_URL").ok(),
            _ => None,
        };
        Self::with_api_key(provider, model, api_key, base_url)
    }

    pub fn with_api_key(
        provider: LlmProvider,
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: Option<String>,
    ) -> Result<Self> {
        let config = match (provider, provider.api_key_var()) {
            (LlmProvider::Local, _) | (_, None) => ProviderConfig::Local,
            (_, Some(var)) => {
                let api_key = api_key
                    .filter(|key| !key.trim().is_empty())
                    .ok_or_else(|| anyhow!(format!("{var} is not set")))?;
                validate_api_key(var, &api_key)?;
                ProviderConfig::Remote(RemoteConfig {
                    api_key,
                    base_url: base_url
                        .unwrap_or_else(|| provider.default_base_url().to_string()),
                })
            }
        };
        Ok(Self {
            http: Client::new(),
            provider,
            model: model.into(),
            config,
        })
    }

    pub fn local() -> Self {
        Self {
            http: Client::new(),
            provider: LlmProvider::Local,
            model: "local".to_string(),
            config: ProviderConfig::Local,
        }
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(&self, req: &LlmRequest) -> Result<LlmResponse> {
        match &self.config {
            ProviderConfig::Remote(cfg) => {
                let payload = json!({
                    "model": self.model,
                    "messages": build_messages(req),
                });
                let value = self.post_chat(cfg, &payload).await?;
                let content = extract_message_text(&value).ok_or_else(|| {
                    anyhow!("missing text in {} response", self.provider.as_str())
                })?;
                let usage: OpenAiUsage = value
                    .get("usage")
                    .and_then(|value| serde_json::from_value(value.clone()).ok())
                    .unwrap_or_default();
                Ok(LlmResponse {
                    content,
                    prompt_tokens: usage.prompt_tokens.unwrap_or(0),
                    completion_tokens: usage.completion_tokens.unwrap_or(0),
                })
            }
            ProviderConfig::Local => Ok(LlmResponse {
                content: synthesize_local_response(req),
                prompt_tokens: 0,
                completion_tokens: 0,
            }),
        }
    }

    pub fn chat_blocking(&self, req: &LlmRequest) -> Result<LlmResponse> {
        let rt = Runtime::new().context("failed to create tokio runtime")?;
        rt.block_on(self.chat(req))
    }

    /// Offers `functions` as tools; the model either picks one or answers in free text.
    pub async fn call_functions(
        &self,
        req: &LlmRequest,
        functions: &[FunctionSpec],
    ) -> Result<FunctionReply> {
        match &self.config {
            ProviderConfig::Remote(cfg) => {
                let tools: Vec<Value> = functions
                    .iter()
                    .map(|spec| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": spec.name,
                                "description": spec.description,
                                "parameters": spec.parameters,
                            }
                        })
                    })
                    .collect();
                let payload = json!({
                    "model": self.model,
                    "messages": build_messages(req),
                    "tools": tools,
                    "tool_choice": "auto",
                });
                let value = self.post_chat(cfg, &payload).await?;
                parse_function_reply(&value)
            }
            ProviderConfig::Local => Ok(FunctionReply::Text(String::new())),
        }
    }

    pub fn call_functions_blocking(
        &self,
        req: &LlmRequest,
        functions: &[FunctionSpec],
    ) -> Result<FunctionReply> {
        let rt = Runtime::new().context("failed to create tokio runtime")?;
        rt.block_on(self.call_functions(req, functions))
    }

    async fn post_chat(&self, cfg: &RemoteConfig, payload: &Value) -> Result<Value> {
        let url = format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'));
        debug!(provider = self.provider.as_str(), model = %self.model, "chat completion request");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&cfg.api_key)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("{} request failed", self.provider.as_str()))?;
        decode_chat_body(self.provider, response).await
    }
}

impl ChatBackend for LlmClient {
    fn complete(&self, req: &LlmRequest) -> Result<LlmResponse> {
        self.chat_blocking(req)
    }

    fn select_function(
        &self,
        req: &LlmRequest,
        functions: &[FunctionSpec],
    ) -> Result<FunctionReply> {
        self.call_functions_blocking(req, functions)
    }
}

fn build_messages(req: &LlmRequest) -> Vec<Value> {
    let mut messages = Vec::new();
    if let Some(system) = &req.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": req.user }));
    messages
}

async fn decode_chat_body(provider: LlmProvider, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(anyhow!(format!(
            "{} returned error (status {}): {}",
            provider.as_str(),
            status,
            body
        )));
    }
    serde_json::from_str(&body)
        .with_context(|| format!("failed to decode {} response", provider.as_str()))
}

/// Reads a chat completion body: a tool call (or legacy `function_call`) wins over text.
pub fn parse_function_reply(value: &Value) -> Result<FunctionReply> {
    let response: ChatResponse =
        serde_json::from_value(value.clone()).context("unexpected chat completion shape")?;
    let Some(choice) = response.choices.into_iter().next() else {
        return Ok(FunctionReply::Text(String::new()));
    };
    let call = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tool| tool.function)
        .next()
        .or(choice.message.function_call);
    match call {
        Some(call) => {
            let arguments = if call.arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&call.arguments).with_context(|| {
                    format!("invalid arguments for function {}", call.name)
                })?
            };
            Ok(FunctionReply::Call {
                name: call.name,
                arguments,
            })
        }
        None => Ok(FunctionReply::Text(
            choice.message.content.unwrap_or_default(),
        )),
    }
}

fn extract_message_text(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.as_array()?.first()?;
    if let Some(text) = choice.get("text").and_then(|t| t.as_str()) {
        return Some(text.to_string());
    }
    let content = choice.get("message")?.get("content")?;
    if let Some(text) = content.as_str() {
        return Some(text.to_string());
    }
    content
        .as_array()?
        .iter()
        .find_map(|part| part.get("text").and_then(|t| t.as_str()))
        .map(|text| text.to_string())
}

/// Offline stand-in: echoes the CONTEXT block when there is one, else a short summary.
fn synthesize_local_response(req: &LlmRequest) -> String {
    if let Some(context) = extract_context_block(&req.user, CONTEXT_START, CONTEXT_END) {
        return context;
    }
    summarize_text(&req.user, 60)
}

fn extract_context_block(text: &str, start_marker: &str, stop_marker: &str) -> Option<String> {
    let start_idx = text.find(start_marker)?;
    let after = &text[start_idx + start_marker.len()..];
    let segment = match after.find(stop_marker) {
        Some(end_idx) => &after[..end_idx],
        None => after,
    };
    Some(segment.trim().to_string())
}

fn summarize_text(text: &str, max_words: usize) -> String {
    if max_words == 0 {
        return String::new();
    }
    let cleaned = text
        .lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join(" ");
    cleaned
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<&str>>()
        .join(" ")
}

fn read_api_key(var: &str) -> Result<String> {
    let value = env::var(var).map_err(|_| anyhow!(format!("{var} is not set")))?;
    validate_api_key(var, &value)?;
    Ok(value)
}

fn validate_api_key(var: &str, value: &str) -> Result<()> {
    if var.contains("OPENAI") && !value.starts_with("sk-") {
        return Err(anyhow!(format!(
            "{} must start with 'sk-' (see https://platform.openai.com/)",
            var
        )));
    }
    if var.contains("DEEPSEEK") && !value.starts_with("sk-") {
        return Err(anyhow!(format!("{} must start with 'sk-'", var)));
    }
    Ok(())
}

#[derive(Default, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_calls_become_function_replies() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "total_for_year",
                            "arguments": "{\"year\": 2024}"
                        }
                    }]
                }
            }]
        });
        let reply = parse_function_reply(&body).unwrap();
        assert_eq!(
            reply,
            FunctionReply::Call {
                name: "total_for_year".to_string(),
                arguments: json!({"year": 2024}),
            }
        );
    }

    #[test]
    fn legacy_function_call_is_accepted() {
        let body = json!({
            "choices": [{
                "message": {
                    "function_call": { "name": "most_recent_invoice", "arguments": "" }
                }
            }]
        });
        let reply = parse_function_reply(&body).unwrap();
        assert_eq!(
            reply,
            FunctionReply::Call {
                name: "most_recent_invoice".to_string(),
                arguments: json!({}),
            }
        );
    }

    #[test]
    fn free_text_means_no_selection() {
        let body = json!({
            "choices": [{ "message": { "content": "I cannot help with that." } }]
        });
        assert_eq!(
            parse_function_reply(&body).unwrap(),
            FunctionReply::Text("I cannot help with that.".to_string())
        );
        assert!(parse_function_reply(&json!({"choices": []})).is_ok());
    }

    #[test]
    fn malformed_arguments_are_errors() {
        let body = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{ "function": { "name": "x", "arguments": "{not json" } }]
                }
            }]
        });
        assert!(parse_function_reply(&body).is_err());
    }

    #[test]
    fn message_text_extraction() {
        let body = json!({"choices": [{"message": {"content": "Hola"}}]});
        assert_eq!(extract_message_text(&body).as_deref(), Some("Hola"));
        let parts = json!({"choices": [{"message": {"content": [{"type": "text", "text": "Parts"}]}}]});
        assert_eq!(extract_message_text(&parts).as_deref(), Some("Parts"));
        assert!(extract_message_text(&json!({})).is_none());
    }

    #[test]
    fn local_client_echoes_context() {
        let client = LlmClient::local();
        let req = LlmRequest {
            system: None,
            user: format!("{CONTEXT_START}\nTotal spend in 2024 is 150.50.\n{CONTEXT_END}\nQuestion: ?"),
        };
        let reply = client.complete(&req).unwrap();
        assert_eq!(reply.content, "Total spend in 2024 is 150.50.");
        assert_eq!(reply.total_tokens(), 0);
        let choice = client.select_function(&req, &[]).unwrap();
        assert_eq!(choice, FunctionReply::Text(String::new()));
    }

    #[test]
    fn remote_providers_need_valid_keys() {
        assert!(LlmClient::with_api_key(LlmProvider::OpenAi, "gpt-4-turbo", None, None).is_err());
        assert!(LlmClient::with_api_key(
            LlmProvider::OpenAi,
            "gpt-4-turbo",
            Some("not-a-key".to_string()),
            None
        )
        .is_err());
        let client = LlmClient::with_api_key(
            LlmProvider::Deepseek,
            "deepseek-chat",
            Some("sk-test".to_string()),
            None,
        )
        .unwrap();
        assert_eq!(client.provider(), LlmProvider::Deepseek);
        assert_eq!(LlmProvider::from_str("OpenAI"), Some(LlmProvider::OpenAi));
        assert_eq!(LlmProvider::from_str("gemini"), None);
    }
}

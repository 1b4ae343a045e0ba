use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LlmConfig;
use crate::utils::{DocsiftError, DocsiftResult};

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
const GEMINI_DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Chat Completions，兼容网关也走这里
    OpenAi,
    Ollama,
    Gemini,
}

impl Provider {
    pub fn parse(name: &str) -> DocsiftResult<Self> {
        match name.to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "ollama" => Ok(Provider::Ollama),
            "gemini" => Ok(Provider::Gemini),
            other => Err(DocsiftError::InvalidInput(format!("不支持的 LLM 提供方: {}", other))),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

pub struct LlmClient {
    client: reqwest::Client,
    provider: Provider,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> DocsiftResult<Self> {
        let provider = Provider::parse(&config.provider)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        Ok(Self { client, provider, config })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// 检查 API key 是否已配置（Ollama 本地部署不需要）
    pub fn is_configured(&self) -> bool {
        match self.provider {
            Provider::Ollama => true,
            _ => !self.config.api_key.is_empty() && self.config.api_key != "your-api-key",
        }
    }

    /// 生成文本，失败统一映射为 Generation 错误
    pub async fn generate(&self, prompt: &str) -> DocsiftResult<String> {
        if !self.is_configured() {
            return Err(DocsiftError::Generation(format!(
                "{:?} 未配置 api_key，请在 config/settings.toml 或 DOCSIFT_LLM__API_KEY 中设置",
                self.provider
            )));
        }

        self.call_api(prompt)
            .await
            .map(|text| text.trim().to_string())
            .map_err(|e| DocsiftError::Generation(format!("{:#}", e)))
    }

    /// 带重试，指数退避
    async fn call_api(&self, prompt: &str) -> Result<String> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = std::time::Duration::from_millis(500 * 2u64.pow(attempt));
                info!("LLM 重试 ({}/{})，等待 {}ms...", attempt + 1, attempts, delay.as_millis());
                tokio::time::sleep(delay).await;
            }

            match self.do_request(prompt).await {
                Ok(content) => return Ok(content),
                Err(e) => {
                    warn!("LLM 调用失败 (尝试 {}/{}): {:#}", attempt + 1, attempts, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("LLM 调用失败")))
    }

    async fn do_request(&self, prompt: &str) -> Result<String> {
        match self.provider {
            Provider::OpenAi => self.openai(prompt).await,
            Provider::Ollama => self.ollama(prompt).await,
            Provider::Gemini => self.gemini(prompt).await,
        }
    }

    async fn openai(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("发送请求失败")?;
        let response = check_status(response).await?;

        let chat: ChatResponse = response.json().await.context("解析 API 响应失败")?;
        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("API 响应中没有 choices")
    }

    async fn ollama(&self, prompt: &str) -> Result<String> {
        let base = base_url(&self.config.api_url, OLLAMA_DEFAULT_URL);
        let request = OllamaRequest {
            model: &self.config.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", base))
            .json(&request)
            .send()
            .await
            .context("发送请求失败")?;
        let response = check_status(response).await?;

        let body: OllamaResponse = response.json().await.context("解析 Ollama 响应失败")?;
        Ok(body.response)
    }

    async fn gemini(&self, prompt: &str) -> Result<String> {
        let base = base_url(&self.config.api_url, GEMINI_DEFAULT_URL);
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", base, self.config.model))
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("发送请求失败")?;
        let response = check_status(response).await?;

        let body: GeminiResponse = response.json().await.context("解析 Gemini 响应失败")?;
        let candidate = body
            .candidates
            .into_iter()
            .next()
            .context("Gemini 响应中没有 candidates")?;
        Ok(candidate
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("API 返回错误 {}: {}", status, body);
    }
    Ok(response)
}

/// OpenAI 的 api_url 是完整地址，其余提供方只配置根地址
fn base_url<'a>(configured: &'a str, fallback: &'a str) -> &'a str {
    if configured.is_empty() || configured.contains("api.openai.com") {
        fallback
    } else {
        configured.trim_end_matches('/')
    }
}

/// 基于选中章节的生成任务
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Summary,
    DidYouKnow,
    Podcast,
}

impl PromptKind {
    pub fn default_instructions(&self) -> &'static str {
        match self {
            PromptKind::Summary => {
                "Summarize the following text in a concise and clear way.\n\
                 Respond only with the summary text, no formatting."
            }
            PromptKind::DidYouKnow => {
                "Generate a Did You Know fact based on the text below.\n\
                 Respond only with the fact, no extra commentary."
            }
            PromptKind::Podcast => {
                "Write a short, engaging 2-minute podcast script based on the text below.\n\
                 Respond only with the script, no extra commentary. Make it sound as natural as possible."
            }
        }
    }

    /// 指令 + `---` 包裹的正文；自定义指令为空时使用默认指令
    pub fn build_prompt(&self, text: &str, custom: Option<&str>) -> String {
        let instructions = custom
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.default_instructions());
        format!("{}\n\n---\n{}\n---\n", instructions, text.trim())
    }
}

//! 语音合成：把播客脚本写成音频文件

use anyhow::{Context, Result};
use quick_xml::escape::escape;
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::config::TtsConfig;
use crate::utils::{DocsiftError, DocsiftResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAi,
    Azure,
}

impl TtsProvider {
    pub fn parse(name: &str) -> DocsiftResult<Self> {
        match name.to_lowercase().as_str() {
            "openai" => Ok(TtsProvider::OpenAi),
            "azure" => Ok(TtsProvider::Azure),
            other => Err(DocsiftError::InvalidInput(format!("不支持的语音合成提供方: {}", other))),
        }
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

pub struct TtsClient {
    client: reqwest::Client,
    provider: TtsProvider,
    config: TtsConfig,
}

impl TtsClient {
    pub fn new(config: TtsConfig) -> DocsiftResult<Self> {
        let provider = TtsProvider::parse(&config.provider)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(180))
            .build()?;
        Ok(Self { client, provider, config })
    }

    pub fn default_language(&self) -> &str {
        &self.config.language
    }

    /// 合成 `text` 并写入 `path`
    pub async fn synthesize(&self, text: &str, language: &str, path: &Path) -> DocsiftResult<()> {
        if text.trim().is_empty() {
            return Err(DocsiftError::InvalidInput("合成文本为空".to_string()));
        }
        if self.config.api_key.is_empty() {
            return Err(DocsiftError::Generation("未配置 tts.api_key".to_string()));
        }

        let audio = match self.provider {
            TtsProvider::OpenAi => self.openai(text).await,
            TtsProvider::Azure => self.azure(text, language).await,
        }
        .map_err(|e| DocsiftError::Generation(format!("{:#}", e)))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &audio).await?;
        info!("音频已保存: {} ({} 字节)", path.display(), audio.len());
        Ok(())
    }

    async fn openai(&self, text: &str) -> Result<Vec<u8>> {
        let request = SpeechRequest {
            model: &self.config.model,
            input: text,
            voice: &self.config.voice,
            response_format: "mp3",
        };
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .context("发送语音合成请求失败")?;
        read_audio(response).await
    }

    async fn azure(&self, text: &str, language: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.config.api_url)
            .header("Ocp-Apim-Subscription-Key", &self.config.api_key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", "audio-24khz-48kbitrate-mono-mp3")
            .body(build_ssml(text, language, &self.config.voice))
            .send()
            .await
            .context("发送语音合成请求失败")?;
        read_audio(response).await
    }
}

async fn read_audio(response: reqwest::Response) -> Result<Vec<u8>> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("语音合成服务返回错误 {}: {}", status, body);
    }
    let bytes = response.bytes().await.context("读取音频数据失败")?;
    Ok(bytes.to_vec())
}

fn build_ssml(text: &str, language: &str, voice: &str) -> String {
    format!(
        "<speak version=\"1.0\" xmlns=\"http://www.w3.org/2001/10/synthesis\" xml:lang=\"{}\"><voice name=\"{}\">{}</voice></speak>",
        escape(language),
        escape(voice),
        escape(text)
    )
}

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{normalize, Embedder};
use crate::config::EmbedderConfig;
use crate::utils::{DocsiftError, DocsiftResult};

/// OpenAI 兼容 `/embeddings` 请求体
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// 远程推理服务的向量化器
pub struct HttpEmbedder {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl HttpEmbedder {
    pub fn new(config: &EmbedderConfig) -> DocsiftResult<Self> {
        if config.api_url.is_empty() {
            return Err(DocsiftError::ModelUnavailable("未配置 embedder.api_url"));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    async fn request(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut request = self.client.post(&self.api_url).json(&EmbeddingRequest {
            model: &self.model,
            input: text,
        });
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.context("发送向量化请求失败")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("向量化服务返回错误 {}: {}", status, body);
        }

        let parsed: EmbeddingResponse = response.json().await.context("解析向量化响应失败")?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .context("向量化响应为空")?;
        debug!("收到 {} 维向量", vector.len());
        Ok(vector)
    }
}

impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> DocsiftResult<Vec<f32>> {
        let vector = self
            .request(text)
            .await
            .map_err(|e| DocsiftError::Embedding(format!("{:#}", e)))?;
        Ok(normalize(vector))
    }
}

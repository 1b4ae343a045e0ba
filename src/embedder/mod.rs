//! 文本向量化：输入 UTF-8 文本，输出单位长度向量，相同输入结果相同

mod hashing;
mod http;

pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;

use std::future::Future;
use tracing::debug;

use crate::config::EmbedderConfig;
use crate::storage::Cache;
use crate::utils::{DocsiftError, DocsiftResult};

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> impl Future<Output = DocsiftResult<Vec<f32>>> + Send;
}

/// 配置选择的向量化后端
pub enum EmbeddingBackend {
    Hashing(HashingEmbedder),
    Http(HttpEmbedder),
}

impl EmbeddingBackend {
    pub fn from_config(config: &EmbedderConfig) -> DocsiftResult<Self> {
        match config.backend.as_str() {
            "hashing" => Ok(Self::Hashing(HashingEmbedder::new(config.dimension))),
            "http" => Ok(Self::Http(HttpEmbedder::new(config)?)),
            other => Err(DocsiftError::InvalidInput(format!("未知的向量化后端: {}", other))),
        }
    }
}

impl Embedder for EmbeddingBackend {
    async fn embed(&self, text: &str) -> DocsiftResult<Vec<f32>> {
        match self {
            Self::Hashing(e) => e.embed(text).await,
            Self::Http(e) => e.embed(text).await,
        }
    }
}

/// 带缓存的向量化器，同一文本只计算一次
pub struct CachedEmbedder<E> {
    inner: E,
    cache: Cache<Vec<f32>>,
}

impl<E: Embedder> CachedEmbedder<E> {
    pub fn new(inner: E, ttl_minutes: i64) -> Self {
        Self {
            inner,
            cache: Cache::new(ttl_minutes),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

impl<E: Embedder> Embedder for CachedEmbedder<E> {
    async fn embed(&self, text: &str) -> DocsiftResult<Vec<f32>> {
        if let Some(hit) = self.cache.get(text) {
            debug!("向量缓存命中 ({} 字符)", text.len());
            return Ok(hit);
        }
        let purged = self.cache.clear_expired();
        if purged > 0 {
            debug!("清理过期向量 {} 条", purged);
        }
        let vector = self.inner.embed(text).await?;
        self.cache.set(text.to_string(), vector.clone());
        Ok(vector)
    }
}

/// 归一化为单位向量；零向量原样返回
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cached_embedder_reuses_vectors() {
        let embedder = CachedEmbedder::new(HashingEmbedder::new(64), 10);
        let first = embedder.embed("quarterly revenue growth").await.unwrap();
        let second = embedder.embed("quarterly revenue growth").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(embedder.cached_entries(), 1);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let config = EmbedderConfig {
            backend: "magic".to_string(),
            ..EmbedderConfig::default()
        };
        assert!(EmbeddingBackend::from_config(&config).is_err());
    }

    #[test]
    fn normalize_yields_unit_length() {
        let v = normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}

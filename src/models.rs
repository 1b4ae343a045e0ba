//! 分类器和向量化器的加载与共享

use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::classifier::{DecisionTreeClassifier, HeadingClassifier, HeuristicClassifier};
use crate::config::AppConfig;
use crate::embedder::{CachedEmbedder, EmbeddingBackend};
use crate::utils::{DocsiftError, DocsiftResult};

pub type SharedEmbedder = Arc<CachedEmbedder<EmbeddingBackend>>;

/// 启动时构建一次，之后只读；模型加载失败时对应的访问器返回 ModelUnavailable
#[derive(Clone, Default)]
pub struct ModelServices {
    classifier: Option<Arc<dyn HeadingClassifier>>,
    embedder: Option<SharedEmbedder>,
}

impl ModelServices {
    pub fn load(config: &AppConfig) -> Self {
        let classifier = match load_classifier(config) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("标题分类器不可用: {}", e);
                None
            }
        };

        let embedder = match EmbeddingBackend::from_config(&config.embedder) {
            Ok(backend) => {
                info!("向量化后端: {}", config.embedder.backend);
                Some(Arc::new(CachedEmbedder::new(
                    backend,
                    config.embedder.cache_ttl_minutes,
                )))
            }
            Err(e) => {
                warn!("向量化器不可用: {}", e);
                None
            }
        };

        Self { classifier, embedder }
    }

    pub fn new(classifier: Option<Arc<dyn HeadingClassifier>>, embedder: Option<SharedEmbedder>) -> Self {
        Self { classifier, embedder }
    }

    pub fn classifier(&self) -> DocsiftResult<Arc<dyn HeadingClassifier>> {
        self.classifier
            .clone()
            .ok_or(DocsiftError::ModelUnavailable("标题分类器"))
    }

    pub fn embedder(&self) -> DocsiftResult<SharedEmbedder> {
        self.embedder
            .clone()
            .ok_or(DocsiftError::ModelUnavailable("向量化器"))
    }

    pub fn is_ready(&self) -> bool {
        self.classifier.is_some() && self.embedder.is_some()
    }
}

fn load_classifier(config: &AppConfig) -> DocsiftResult<Arc<dyn HeadingClassifier>> {
    match config.classifier.backend.as_str() {
        "heuristic" => Ok(Arc::new(HeuristicClassifier::default())),
        "tree" => {
            let tree = DecisionTreeClassifier::load(Path::new(&config.classifier.model_path))?;
            Ok(Arc::new(tree))
        }
        other => Err(DocsiftError::InvalidInput(format!("未知的分类器后端: {}", other))),
    }
}

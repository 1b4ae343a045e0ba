pub mod files;
pub mod logger;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocsiftError {
    #[error("输入错误: {0}")]
    InvalidInput(String),

    #[error("PDF提取失败: {0}")]
    Extraction(String),

    #[error("模型未加载: {0}")]
    ModelUnavailable(&'static str),

    #[error("向量化失败: {0}")]
    Embedding(String),

    #[error("标注失败: {0}")]
    Annotation(String),

    #[error("生成失败: {0}")]
    Generation(String),

    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("网络请求错误: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("PDF处理错误: {0}")]
    Pdf(#[from] lopdf::Error),
}

pub type DocsiftResult<T> = Result<T, DocsiftError>;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::parser::{DocumentOutline, Section};
use crate::utils::DocsiftResult;

/// 已上传并完成提取的文档
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoredDocument {
    pub id: Option<i64>,
    /// uploads 目录下的文件名（带时间戳前缀）
    pub filename: String,
    pub original_name: String,
    pub outline_json: String,
    pub sections_json: String,
    pub line_count: i64,
    pub row_count: i64,
    pub created_at: Option<String>,
}

impl StoredDocument {
    pub fn outline(&self) -> DocsiftResult<DocumentOutline> {
        Ok(serde_json::from_str(&self.outline_json)?)
    }

    pub fn sections(&self) -> DocsiftResult<Vec<Section>> {
        Ok(serde_json::from_str(&self.sections_json)?)
    }

    /// 文件列表中的一行
    pub fn listing(&self) -> DocsiftResult<DocumentListing> {
        Ok(DocumentListing {
            filename: self.filename.clone(),
            original_name: self.original_name.clone(),
            title: self.outline()?.title,
            section_count: self.sections()?.len(),
            line_count: self.line_count,
            created_at: self.created_at.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentListing {
    pub filename: String,
    pub original_name: String,
    pub title: String,
    pub section_count: usize,
    pub line_count: i64,
    pub created_at: Option<String>,
}

/// 一次排序查询的记录
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueryRun {
    pub id: Option<i64>,
    /// text | persona | contradiction
    pub mode: String,
    pub query_text: String,
    pub output_json: String,
    pub created_at: Option<String>,
}

//! 查询流程：候选章节收集、向量化、MMR 选择、输出文档组装

pub mod mmr;

pub use mmr::{MmrOutcome, SelectionMode};

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::annotator::SelectedRegion;
use crate::config::RankingConfig;
use crate::embedder::Embedder;
use crate::parser::{PageRect, Section};
use crate::utils::{DocsiftError, DocsiftResult};

/// 参与排序的一个章节
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub document: String,
    pub heading: String,
    pub text: String,
    pub page: Option<u32>,
    pub rects: Vec<PageRect>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
}

impl Candidate {
    pub fn from_section(document: &str, section: &Section) -> Self {
        Self {
            document: document.to_string(),
            heading: section.heading.clone(),
            text: section.text.clone(),
            page: Some(section.page),
            rects: section.rects.clone(),
            start_line: Some(section.start_line),
            end_line: Some(section.end_line),
            start_page: section.start_page,
            end_page: section.end_page,
        }
    }
}

/// 调用方提交的文档：优先使用 sections，缺失时退回大纲条目
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentPayload {
    #[serde(alias = "serverFilename", alias = "name")]
    pub filename: String,
    #[serde(default)]
    pub sections: Vec<PayloadItem>,
    #[serde(default)]
    pub outline: Option<PayloadOutline>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayloadOutline {
    #[serde(default)]
    pub outline: Vec<PayloadItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayloadItem {
    pub heading: Option<String>,
    pub text: Option<String>,
    pub level: Option<String>,
    pub page: Option<u32>,
    #[serde(default)]
    pub rects: Vec<PageRect>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
}

impl DocumentPayload {
    pub fn candidates(&self) -> Vec<Candidate> {
        let from_outline = self.sections.is_empty();
        let items = if from_outline {
            self.outline.as_ref().map(|o| o.outline.as_slice()).unwrap_or(&[])
        } else {
            self.sections.as_slice()
        };

        items
            .iter()
            .filter_map(|item| {
                let text = item.text.as_ref().filter(|t| !t.trim().is_empty())?;
                // 大纲条目只有标题，没有正文和矩形
                if from_outline || (item.heading.is_none() && item.level.is_some()) {
                    return Some(Candidate {
                        document: self.filename.clone(),
                        heading: text.clone(),
                        text: text.clone(),
                        page: item.page,
                        rects: Vec::new(),
                        start_line: None,
                        end_line: None,
                        start_page: None,
                        end_page: None,
                    });
                }
                Some(Candidate {
                    document: self.filename.clone(),
                    heading: item.heading.clone().unwrap_or_else(|| text.clone()),
                    text: text.clone(),
                    page: item.page,
                    rects: item.rects.clone(),
                    start_line: item.start_line,
                    end_line: item.end_line,
                    start_page: item.start_page,
                    end_page: item.end_page,
                })
            })
            .collect()
    }
}

/// 从 JSON 文本解析文档列表，支持 `[...]` 或 `{"documents": [...]}`
pub fn parse_payloads(json: &str) -> DocsiftResult<Vec<DocumentPayload>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Envelope {
        List(Vec<DocumentPayload>),
        Wrapped { documents: Vec<DocumentPayload> },
    }

    let envelope: Envelope = serde_json::from_str(json)
        .map_err(|e| DocsiftError::InvalidInput(format!("文档列表 JSON 无效: {}", e)))?;
    Ok(match envelope {
        Envelope::List(documents) => documents,
        Envelope::Wrapped { documents } => documents,
    })
}

/// 查询类型
#[derive(Debug, Clone, PartialEq)]
pub enum RankingQuery {
    Text(String),
    Persona { persona: String, job: String },
    Contradiction(String),
}

impl RankingQuery {
    /// 送入向量化器的查询文本
    pub fn query_text(&self) -> String {
        match self {
            RankingQuery::Text(text) | RankingQuery::Contradiction(text) => text.clone(),
            RankingQuery::Persona { persona, job } => format!("{} {}", job, persona),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            RankingQuery::Text(_) => "text",
            RankingQuery::Persona { .. } => "persona",
            RankingQuery::Contradiction(_) => "contradiction",
        }
    }

    fn validate(&self) -> DocsiftResult<()> {
        let missing = match self {
            RankingQuery::Text(text) | RankingQuery::Contradiction(text) => text.trim().is_empty(),
            RankingQuery::Persona { persona, job } => persona.trim().is_empty() || job.trim().is_empty(),
        };
        if missing {
            return Err(DocsiftError::InvalidInput("查询文本为空".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMetadata {
    pub input_documents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_to_be_done: Option<String>,
    pub processing_timestamp: String,
    #[serde(default)]
    pub annotated_files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedSection {
    pub document: String,
    pub section_title: String,
    pub importance_rank: usize,
    /// 未知页码为 -1
    pub page_number: i64,
    pub similarity: f32,
    pub rects: Vec<PageRect>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsectionAnalysis {
    pub document: String,
    pub refined_text: String,
    pub page_number: i64,
    pub rects: Vec<PageRect>,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
}

/// 一次排序的输出文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedOutput {
    pub metadata: OutputMetadata,
    pub extracted_sections: Vec<ExtractedSection>,
    pub subsection_analysis: Vec<SubsectionAnalysis>,
    pub sections_formatted: String,
}

impl RankedOutput {
    /// 按文档分组的高亮区域，交给标注器
    pub fn selected_regions(&self) -> BTreeMap<String, Vec<SelectedRegion>> {
        let mut regions: BTreeMap<String, Vec<SelectedRegion>> = BTreeMap::new();
        for section in &self.extracted_sections {
            regions
                .entry(section.document.clone())
                .or_default()
                .push(SelectedRegion {
                    importance_rank: section.importance_rank,
                    rects: section.rects.clone(),
                });
        }
        regions
    }
}

/// 文本查询同时给出正相关和负相关两组结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextQueryOutput {
    #[serde(rename = "Positive")]
    pub positive: RankedOutput,
    #[serde(rename = "Negative")]
    pub negative: RankedOutput,
}

pub struct QueryService<E> {
    embedder: Arc<E>,
    lambda: f32,
    default_top_k: usize,
}

impl<E: Embedder> QueryService<E> {
    pub fn new(embedder: Arc<E>, config: &RankingConfig) -> Self {
        Self {
            embedder,
            lambda: config.lambda,
            default_top_k: config.top_k,
        }
    }

    /// 自由文本查询：MMR 正向结果 + 负相关章节
    pub async fn text_query(
        &self,
        text: &str,
        documents: &[String],
        candidates: &[Candidate],
        top_k: Option<usize>,
    ) -> DocsiftResult<TextQueryOutput> {
        let query = RankingQuery::Text(text.to_string());
        let (query_vec, vectors) = self.embed_all(&query, candidates).await?;

        let positive = self.select(&query_vec, &vectors, top_k, SelectionMode::Relevance);
        let negative = self.select(&query_vec, &vectors, top_k, SelectionMode::Contradiction);
        info!(
            "文本查询完成: {} 个正向, {} 个负相关",
            positive.selected.len(),
            negative.selected.len()
        );

        Ok(TextQueryOutput {
            positive: build_output(&query, documents, candidates, &positive),
            negative: build_output(&query, documents, candidates, &negative),
        })
    }

    /// 角色 + 任务查询
    pub async fn persona_query(
        &self,
        persona: &str,
        job: &str,
        documents: &[String],
        candidates: &[Candidate],
        top_k: Option<usize>,
    ) -> DocsiftResult<RankedOutput> {
        let query = RankingQuery::Persona {
            persona: persona.to_string(),
            job: job.to_string(),
        };
        self.run(&query, documents, candidates, top_k).await
    }

    /// 只返回与查询负相关的章节
    pub async fn contradiction_query(
        &self,
        text: &str,
        documents: &[String],
        candidates: &[Candidate],
    ) -> DocsiftResult<RankedOutput> {
        let query = RankingQuery::Contradiction(text.to_string());
        self.run(&query, documents, candidates, None).await
    }

    pub async fn run(
        &self,
        query: &RankingQuery,
        documents: &[String],
        candidates: &[Candidate],
        top_k: Option<usize>,
    ) -> DocsiftResult<RankedOutput> {
        let (query_vec, vectors) = self.embed_all(query, candidates).await?;
        let mode = match query {
            RankingQuery::Contradiction(_) => SelectionMode::Contradiction,
            _ => SelectionMode::Relevance,
        };
        let outcome = self.select(&query_vec, &vectors, top_k, mode);
        info!("{} 查询完成: 选出 {} 个章节", query.mode(), outcome.selected.len());
        Ok(build_output(query, documents, candidates, &outcome))
    }

    async fn embed_all(
        &self,
        query: &RankingQuery,
        candidates: &[Candidate],
    ) -> DocsiftResult<(Vec<f32>, Vec<Vec<f32>>)> {
        query.validate()?;
        if candidates.is_empty() {
            return Err(DocsiftError::InvalidInput("所选文档中没有可用的章节".to_string()));
        }

        let query_vec = self.embedder.embed(&query.query_text()).await?;
        let mut vectors = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            vectors.push(self.embedder.embed(&candidate.text).await?);
        }
        debug!("已向量化 {} 个候选章节", vectors.len());
        Ok((query_vec, vectors))
    }

    fn select(
        &self,
        query_vec: &[f32],
        vectors: &[Vec<f32>],
        top_k: Option<usize>,
        mode: SelectionMode,
    ) -> MmrOutcome {
        let k = top_k.unwrap_or(self.default_top_k).min(vectors.len());
        mmr::select(query_vec, vectors, self.lambda, k, mode)
    }
}

/// 按选择顺序组装输出文档，排名从 1 开始
pub fn build_output(
    query: &RankingQuery,
    documents: &[String],
    candidates: &[Candidate],
    outcome: &MmrOutcome,
) -> RankedOutput {
    let (selected_text, persona, job_to_be_done) = match query {
        RankingQuery::Text(text) | RankingQuery::Contradiction(text) => (Some(text.clone()), None, None),
        RankingQuery::Persona { persona, job } => (None, Some(persona.clone()), Some(job.clone())),
    };

    let mut extracted_sections = Vec::with_capacity(outcome.selected.len());
    let mut subsection_analysis = Vec::with_capacity(outcome.selected.len());
    for (rank, &index) in outcome.selected.iter().enumerate() {
        let candidate = &candidates[index];
        let page_number = candidate.page.map(i64::from).unwrap_or(-1);
        extracted_sections.push(ExtractedSection {
            document: candidate.document.clone(),
            section_title: candidate.heading.clone(),
            importance_rank: rank + 1,
            page_number,
            similarity: outcome.similarities[index],
            rects: candidate.rects.clone(),
            start_line: candidate.start_line,
            end_line: candidate.end_line,
            start_page: candidate.start_page,
            end_page: candidate.end_page,
        });
        subsection_analysis.push(SubsectionAnalysis {
            document: candidate.document.clone(),
            refined_text: candidate.text.clone(),
            page_number,
            rects: candidate.rects.clone(),
            start_line: candidate.start_line,
            end_line: candidate.end_line,
            start_page: candidate.start_page,
            end_page: candidate.end_page,
        });
    }

    let sections_formatted = format_sections(&extracted_sections, &subsection_analysis);

    RankedOutput {
        metadata: OutputMetadata {
            input_documents: documents.to_vec(),
            selected_text,
            persona,
            job_to_be_done,
            processing_timestamp: Local::now().to_rfc3339(),
            annotated_files: BTreeMap::new(),
        },
        extracted_sections,
        subsection_analysis,
        sections_formatted,
    }
}

/// 供 LLM 使用的纯文本：`Section i (Rank r): 标题\n正文`，块之间空一行
fn format_sections(sections: &[ExtractedSection], analysis: &[SubsectionAnalysis]) -> String {
    sections
        .iter()
        .zip(analysis)
        .filter(|(_, a)| !a.refined_text.is_empty())
        .enumerate()
        .map(|(i, (s, a))| {
            format!(
                "Section {} (Rank {}): {}\n{}",
                i + 1,
                s.importance_rank,
                s.section_title,
                a.refined_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

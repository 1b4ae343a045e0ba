pub mod features;
pub mod grouper;
pub mod line_extractor;
pub mod noise;
pub mod reconstructor;

pub use features::{FeatureNormalizer, FeatureVector};
pub use grouper::SectionGrouper;
pub use line_extractor::LineExtractor;
pub use reconstructor::SectionReconstructor;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

use crate::classifier::HeadingClassifier;
use crate::utils::{DocsiftError, DocsiftResult};

/// 页面坐标系中的矩形，原点在左上角，y 向下增长
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }
}

/// 物理文本行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalLine {
    /// 全文档连续编号，从 0 开始
    pub index: usize,
    /// 页码，从 1 开始
    pub page: u32,
    pub text: String,
    pub bbox: BBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineStyle {
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
}

/// 提取阶段的输出：物理行 + 首个 span 的样式和纵坐标
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedLine {
    pub line: PhysicalLine,
    pub style: LineStyle,
    pub y: f32,
}

/// 行组的文本特征
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RowTextFeatures {
    pub text_length: usize,
    pub capitalization_ratio: f32,
    pub starts_with_numbering: bool,
    pub prefix_dot_count: usize,
}

/// 连续同样式物理行合并后的段落/标题候选
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedRow {
    pub text: String,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub page: u32,
    pub start_line: usize,
    pub end_line: usize,
    pub position_y: f32,
    pub y_gap: Option<f32>,
    pub features: RowTextFeatures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Title,
    H1,
    H2,
    None,
}

impl Label {
    pub fn is_heading(&self) -> bool {
        !matches!(self, Label::None)
    }

    pub fn parse(value: &str) -> Option<Label> {
        match value {
            "Title" => Some(Label::Title),
            "H1" => Some(Label::H1),
            "H2" => Some(Label::H2),
            "None" => Some(Label::None),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Label::Title => "Title",
            Label::H1 => "H1",
            Label::H2 => "H2",
            Label::None => "None",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub row: GroupedRow,
    pub label: Label,
}

/// 单页高亮矩形
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRect {
    pub page: u32,
    pub bbox: [f32; 4],
}

/// 标题 + 正文，带页码和行号溯源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    pub text: String,
    pub level: Label,
    pub page: u32,
    pub start_line: usize,
    pub end_line: usize,
    pub start_page: Option<u32>,
    pub end_page: Option<u32>,
    pub rects: Vec<PageRect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub level: Label,
    pub text: String,
    pub page: u32,
}

/// 大纲视图，仅用于展示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutline {
    pub title: String,
    pub outline: Vec<OutlineEntry>,
}

/// 版面分析结果（分类之前）
#[derive(Debug, Clone, Default)]
pub struct DocumentLayout {
    pub lines: Vec<PhysicalLine>,
    pub rows: Vec<GroupedRow>,
}

impl DocumentLayout {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.rows.is_empty()
    }
}

/// 一篇 PDF 的全部提取结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub outline: DocumentOutline,
    pub sections: Vec<Section>,
    pub line_count: usize,
    pub row_count: usize,
}

/// 统一提取管道
pub struct ExtractionPipeline {
    extractor: LineExtractor,
    grouper: SectionGrouper,
    normalizer: FeatureNormalizer,
    reconstructor: SectionReconstructor,
}

impl ExtractionPipeline {
    pub fn new() -> Self {
        Self {
            extractor: LineExtractor::new(),
            grouper: SectionGrouper::new(),
            normalizer: FeatureNormalizer::new(),
            reconstructor: SectionReconstructor::new(),
        }
    }

    /// 解析PDF得到物理行和行组；打开或解析失败时记录日志并返回空结果
    pub fn analyze(&self, pdf_path: &Path) -> DocumentLayout {
        match self.try_analyze(pdf_path) {
            Ok(layout) => layout,
            Err(e) => {
                warn!("{}", e);
                DocumentLayout::default()
            }
        }
    }

    /// 同 analyze，但把失败作为 Extraction 错误返回
    pub fn try_analyze(&self, pdf_path: &Path) -> DocsiftResult<DocumentLayout> {
        let extracted = self
            .extractor
            .extract(pdf_path)
            .map_err(|e| DocsiftError::Extraction(format!("{}: {:#}", pdf_path.display(), e)))?;

        let rows = self.grouper.group(&extracted);
        let lines = extracted.into_iter().map(|l| l.line).collect();
        Ok(DocumentLayout { lines, rows })
    }

    /// 分类并重建章节
    pub fn classify(&self, layout: &DocumentLayout, classifier: &dyn HeadingClassifier) -> ProcessedDocument {
        let features = self.normalizer.normalize(&layout.rows);
        let labels = classifier.predict(&features);

        let labeled: Vec<LabeledRow> = layout
            .rows
            .iter()
            .cloned()
            .zip(labels)
            .map(|(row, label)| LabeledRow { row, label })
            .collect();

        let outline = self.reconstructor.outline(&labeled);
        let sections = self.reconstructor.reconstruct(&labeled, &layout.lines);

        ProcessedDocument {
            outline,
            sections,
            line_count: layout.lines.len(),
            row_count: layout.rows.len(),
        }
    }

    /// 处理一篇PDF，返回大纲和章节
    pub fn process(&self, pdf_path: &Path, classifier: &dyn HeadingClassifier) -> ProcessedDocument {
        info!("开始提取管道: {}", pdf_path.display());

        let layout = self.analyze(pdf_path);
        info!("提取到 {} 行, {} 个行组", layout.lines.len(), layout.rows.len());

        let document = self.classify(&layout, classifier);
        info!(
            "识别到 {} 个标题, {} 个章节",
            document.outline.outline.len(),
            document.sections.len()
        );
        document
    }
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

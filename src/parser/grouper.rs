use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::noise::is_noise;
use super::{ExtractedLine, GroupedRow, LineStyle, RowTextFeatures};

/// 字号差小于该值视为同一样式
const FONT_SIZE_TOLERANCE: f32 = 0.5;

static NUMBERING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)*(\.|\))\s").expect("valid numbering regex"));

static DOTTED_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^((?:\d+\.)+)\d+").expect("valid dotted prefix regex"));

/// 将连续同样式的物理行合并为行组
pub struct SectionGrouper;

struct OpenGroup {
    style: LineStyle,
    page: u32,
    position_y: f32,
    y_gap: Option<f32>,
    texts: Vec<String>,
    start_line: usize,
    end_line: usize,
}

impl OpenGroup {
    fn open(line: &ExtractedLine, y_gap: Option<f32>) -> Self {
        Self {
            style: line.style,
            page: line.line.page,
            position_y: line.y,
            y_gap,
            texts: vec![line.line.text.clone()],
            start_line: line.line.index,
            end_line: line.line.index,
        }
    }

    fn same_style(&self, style: &LineStyle) -> bool {
        (self.style.font_size - style.font_size).abs() < FONT_SIZE_TOLERANCE
            && self.style.bold == style.bold
            && self.style.italic == style.italic
    }

    fn close(self) -> Option<GroupedRow> {
        let text = self.texts.join(" ");
        if text.trim().chars().count() <= 2 || is_noise(&text) {
            debug!("丢弃行组 [{}..={}]: {:?}", self.start_line, self.end_line, text);
            return None;
        }
        let features = text_features(&text);
        Some(GroupedRow {
            text,
            font_size: self.style.font_size,
            bold: self.style.bold,
            italic: self.style.italic,
            page: self.page,
            start_line: self.start_line,
            end_line: self.end_line,
            position_y: self.position_y,
            y_gap: self.y_gap,
            features,
        })
    }
}

impl SectionGrouper {
    pub fn new() -> Self {
        Self
    }

    /// 输入为按阅读顺序排列的物理行，每页结束时强制收束当前行组
    pub fn group(&self, lines: &[ExtractedLine]) -> Vec<GroupedRow> {
        let mut rows = Vec::new();
        let mut current: Option<OpenGroup> = None;
        let mut prev_y: Option<f32> = None;
        let mut page: Option<u32> = None;

        for line in lines {
            if page != Some(line.line.page) {
                if let Some(group) = current.take() {
                    rows.extend(group.close());
                }
                prev_y = None;
                page = Some(line.line.page);
            }

            let y_gap = prev_y.map(|prev| (line.y - prev).abs());
            prev_y = Some(line.y);

            match current.as_mut() {
                Some(group) if group.same_style(&line.style) => {
                    group.texts.push(line.line.text.clone());
                    group.end_line = line.line.index;
                }
                _ => {
                    if let Some(group) = current.take() {
                        rows.extend(group.close());
                    }
                    current = Some(OpenGroup::open(line, y_gap));
                }
            }
        }

        if let Some(group) = current {
            rows.extend(group.close());
        }

        debug!("{} 行合并为 {} 个行组", lines.len(), rows.len());
        rows
    }
}

impl Default for SectionGrouper {
    fn default() -> Self {
        Self::new()
    }
}

pub fn text_features(text: &str) -> RowTextFeatures {
    let upper = text.chars().filter(|c| c.is_uppercase()).count();
    let alpha = text.chars().filter(|c| c.is_alphabetic()).count();
    let capitalization_ratio = if alpha > 0 { upper as f32 / alpha as f32 } else { 0.0 };
    let prefix_dot_count = DOTTED_PREFIX
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().matches('.').count())
        .unwrap_or(0);

    RowTextFeatures {
        text_length: text.chars().count(),
        capitalization_ratio,
        starts_with_numbering: NUMBERING.is_match(text),
        prefix_dot_count,
    }
}

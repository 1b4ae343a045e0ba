//! 标题分类器：输入固定顺序的特征向量，输出 Title / H1 / H2 / None

mod tree;

pub use tree::DecisionTreeClassifier;

use crate::parser::{FeatureVector, Label};

/// 预训练的标题分类器，无状态、只读，可在多个请求之间共享
pub trait HeadingClassifier: Send + Sync {
    fn predict(&self, rows: &[FeatureVector]) -> Vec<Label>;
}

/// 无模型文件时的规则分类器
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    pub title_ratio: f32,
    pub h1_ratio: f32,
    pub h2_ratio: f32,
    /// 归一化文本长度上限，超过则视为正文
    pub max_heading_length: f32,
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self {
            title_ratio: 1.8,
            h1_ratio: 1.3,
            h2_ratio: 1.1,
            max_heading_length: 0.35,
        }
    }
}

impl HeuristicClassifier {
    fn label(&self, f: &FeatureVector, title_taken: &mut bool) -> Label {
        if f.text_length > self.max_heading_length {
            return Label::None;
        }
        if !*title_taken && f.font_size_rank == 1.0 && f.font_ratio >= self.title_ratio {
            *title_taken = true;
            return Label::Title;
        }
        if f.font_ratio >= self.h1_ratio {
            return Label::H1;
        }
        let emphasised = f.is_bold == 1.0 || f.starts_with_numbering == 1.0;
        if f.font_ratio >= self.h2_ratio || (emphasised && f.font_ratio >= 1.0) {
            return Label::H2;
        }
        Label::None
    }
}

impl HeadingClassifier for HeuristicClassifier {
    fn predict(&self, rows: &[FeatureVector]) -> Vec<Label> {
        let mut title_taken = false;
        rows.iter().map(|f| self.label(f, &mut title_taken)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(ratio: f32, rank: f32, length: f32, bold: bool) -> FeatureVector {
        FeatureVector {
            font_ratio: ratio,
            font_size_rank: rank,
            text_length: length,
            capitalization_ratio: 0.1,
            position_y: 0.5,
            is_bold: if bold { 1.0 } else { 0.0 },
            is_italic: 0.0,
            starts_with_numbering: 0.0,
            font_size_count: 0.0,
            is_unique_font_size: 0.0,
            y_gap_scaled: 0.0,
            font_size_scaled: 0.0,
        }
    }

    #[test]
    fn heuristic_labels_by_relative_size() {
        let rows = vec![
            features(2.4, 1.0, 0.1, true),
            features(2.4, 1.0, 0.1, true),
            features(1.4, 2.0, 0.1, true),
            features(1.0, 4.0, 0.1, true),
            features(1.0, 4.0, 0.9, false),
            features(1.0, 4.0, 0.2, false),
        ];
        let labels = HeuristicClassifier::default().predict(&rows);
        assert_eq!(
            labels,
            vec![Label::Title, Label::H1, Label::H1, Label::H2, Label::None, Label::None]
        );
    }
}

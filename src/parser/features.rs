use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::GroupedRow;

/// 缺失行间距时的默认值
const DEFAULT_Y_GAP: f32 = 2.0;

/// 分类器输入特征，字段顺序即模型的特征顺序
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub font_ratio: f32,
    pub font_size_rank: f32,
    pub text_length: f32,
    pub capitalization_ratio: f32,
    pub position_y: f32,
    pub is_bold: f32,
    pub is_italic: f32,
    pub starts_with_numbering: f32,
    pub font_size_count: f32,
    pub is_unique_font_size: f32,
    /// 不进入分类器，仅供调试
    pub y_gap_scaled: f32,
    pub font_size_scaled: f32,
}

impl FeatureVector {
    pub const NAMES: [&'static str; 10] = [
        "Font Ratio",
        "Font Size Rank",
        "Text Length",
        "Capitalization Ratio",
        "Position Y",
        "Is Bold",
        "Is Italic",
        "Starts with Numbering",
        "Font Size Count",
        "Is Unique Font Size",
    ];

    pub fn to_array(&self) -> [f32; 10] {
        [
            self.font_ratio,
            self.font_size_rank,
            self.text_length,
            self.capitalization_ratio,
            self.position_y,
            self.is_bold,
            self.is_italic,
            self.starts_with_numbering,
            self.font_size_count,
            self.is_unique_font_size,
        ]
    }
}

/// 按文档计算归一化特征
pub struct FeatureNormalizer;

impl FeatureNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, rows: &[GroupedRow]) -> Vec<FeatureVector> {
        if rows.is_empty() {
            return Vec::new();
        }

        let sizes: Vec<f32> = rows.iter().map(|r| r.font_size).collect();
        let ranks = font_size_ranks(&sizes);
        let counts = font_size_counts(&sizes);
        let modal = modal_font_size(&counts);

        let size_scaled = min_max(&sizes);
        let length_scaled = min_max(&rows.iter().map(|r| r.features.text_length as f32).collect::<Vec<_>>());
        let caps_scaled = min_max(&rows.iter().map(|r| r.features.capitalization_ratio).collect::<Vec<_>>());
        let position_scaled = min_max(&rows.iter().map(|r| r.position_y).collect::<Vec<_>>());
        let gap_scaled = min_max(
            &rows
                .iter()
                .map(|r| r.y_gap.unwrap_or(DEFAULT_Y_GAP))
                .collect::<Vec<_>>(),
        );

        let row_counts: Vec<f32> = sizes.iter().map(|s| counts[&s.to_bits()] as f32).collect();
        let count_scaled = min_max(&row_counts);

        rows.iter()
            .enumerate()
            .map(|(i, row)| FeatureVector {
                font_ratio: if modal > 0.0 { row.font_size / modal } else { 1.0 },
                font_size_rank: ranks[i] as f32,
                text_length: length_scaled[i],
                capitalization_ratio: caps_scaled[i],
                position_y: position_scaled[i],
                is_bold: flag(row.bold),
                is_italic: flag(row.italic),
                starts_with_numbering: flag(row.features.starts_with_numbering),
                font_size_count: count_scaled[i],
                is_unique_font_size: flag(row_counts[i] == 1.0),
                y_gap_scaled: gap_scaled[i],
                font_size_scaled: size_scaled[i],
            })
            .collect()
    }
}

impl Default for FeatureNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// 0–1 缩放；少于两个值或取值恒定时全部为 0
pub fn min_max(values: &[f32]) -> Vec<f32> {
    if values.len() < 2 {
        return vec![0.0; values.len()];
    }
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range <= 0.0 || !range.is_finite() {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// 不同字号从大到小排名，最大为 1
fn font_size_ranks(sizes: &[f32]) -> Vec<usize> {
    let mut distinct: Vec<f32> = sizes.to_vec();
    distinct.sort_by(|a, b| b.total_cmp(a));
    distinct.dedup_by(|a, b| a.to_bits() == b.to_bits());
    sizes
        .iter()
        .map(|s| {
            distinct
                .iter()
                .position(|d| d.to_bits() == s.to_bits())
                .map(|p| p + 1)
                .unwrap_or(distinct.len())
        })
        .collect()
}

fn font_size_counts(sizes: &[f32]) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for size in sizes {
        *counts.entry(size.to_bits()).or_insert(0) += 1;
    }
    counts
}

/// 出现次数最多的字号；并列时取较小者
fn modal_font_size(counts: &BTreeMap<u32, usize>) -> f32 {
    counts
        .iter()
        .map(|(bits, count)| (f32::from_bits(*bits), *count))
        .fold(None, |best: Option<(f32, usize)>, (size, count)| match best {
            Some((best_size, best_count))
                if best_count > count || (best_count == count && best_size <= size) =>
            {
                Some((best_size, best_count))
            }
            _ => Some((size, count)),
        })
        .map(|(size, _)| size)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::grouper::text_features;

    fn row(text: &str, size: f32, bold: bool, y: f32, gap: Option<f32>) -> GroupedRow {
        GroupedRow {
            text: text.to_string(),
            font_size: size,
            bold,
            italic: false,
            page: 1,
            start_line: 0,
            end_line: 0,
            position_y: y,
            y_gap: gap,
            features: text_features(text),
        }
    }

    #[test]
    fn ranks_ratio_and_counts() {
        let rows = vec![
            row("Title Of Paper", 24.0, true, 40.0, None),
            row("Body text one", 10.0, false, 100.0, Some(60.0)),
            row("Heading", 14.0, true, 150.0, Some(50.0)),
            row("Body text two", 10.0, false, 170.0, Some(20.0)),
        ];
        let features = FeatureNormalizer::new().normalize(&rows);

        let ranks: Vec<f32> = features.iter().map(|f| f.font_size_rank).collect();
        assert_eq!(ranks, vec![1.0, 3.0, 2.0, 3.0]);
        assert!((features[0].font_ratio - 2.4).abs() < 1e-5);
        assert_eq!(features[1].font_ratio, 1.0);
        assert_eq!(features[0].is_unique_font_size, 1.0);
        assert_eq!(features[1].is_unique_font_size, 0.0);
        // counts [1,2,1,2] -> scaled [0,1,0,1]
        assert_eq!(features[1].font_size_count, 1.0);
        assert_eq!(features[0].font_size_count, 0.0);
        assert_eq!(features[0].position_y, 0.0);
        assert_eq!(features[3].position_y, 1.0);
        // missing gap defaults to 2, the minimum here
        assert_eq!(features[0].y_gap_scaled, 0.0);
        assert_eq!(features[1].y_gap_scaled, 1.0);
        assert_eq!(features[0].is_bold, 1.0);
    }

    #[test]
    fn single_row_scales_to_zero() {
        let rows = vec![row("Only row here", 12.0, false, 300.0, None)];
        let features = FeatureNormalizer::new().normalize(&rows);
        assert_eq!(features.len(), 1);
        let f = features[0];
        assert_eq!(f.text_length, 0.0);
        assert_eq!(f.position_y, 0.0);
        assert_eq!(f.font_size_count, 0.0);
        assert_eq!(f.font_ratio, 1.0);
        assert_eq!(f.font_size_rank, 1.0);
        assert!(FeatureNormalizer::new().normalize(&[]).is_empty());
    }

    #[test]
    fn modal_ties_pick_smaller_size() {
        let counts = font_size_counts(&[12.0, 10.0, 12.0, 10.0]);
        assert_eq!(modal_font_size(&counts), 10.0);
    }

    #[test]
    fn feature_array_follows_classifier_order() {
        let rows = vec![row("1. Scope", 12.0, true, 10.0, None), row("body", 10.0, false, 20.0, Some(4.0))];
        let features = FeatureNormalizer::new().normalize(&rows);
        let arr = features[0].to_array();
        assert_eq!(arr.len(), FeatureVector::NAMES.len());
        assert_eq!(arr[1], 1.0);
        assert_eq!(arr[5], 1.0);
        assert_eq!(arr[7], 1.0);
    }
}

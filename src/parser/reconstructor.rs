use std::collections::HashMap;
use tracing::debug;

use super::{BBox, DocumentOutline, Label, LabeledRow, OutlineEntry, PageRect, PhysicalLine, Section};

pub const UNTITLED: &str = "Untitled Document";

/// 根据标题标签重建章节，并计算每页的高亮矩形
pub struct SectionReconstructor;

impl SectionReconstructor {
    pub fn new() -> Self {
        Self
    }

    pub fn reconstruct(&self, rows: &[LabeledRow], lines: &[PhysicalLine]) -> Vec<Section> {
        let mut sections = Vec::new();

        for (i, heading) in rows.iter().enumerate() {
            if !heading.label.is_heading() {
                continue;
            }

            let body: Vec<&LabeledRow> = rows[i + 1..]
                .iter()
                .take_while(|r| !r.label.is_heading())
                .collect();

            let mut text = heading.row.text.clone();
            for row in &body {
                text.push(' ');
                text.push_str(&row.row.text);
            }

            let start_line = heading.row.start_line;
            let end_line = body.last().map(|r| r.row.end_line).unwrap_or(heading.row.end_line);

            let start_page = lines.get(start_line).map(|l| l.page);
            let end_page = lines.get(end_line).map(|l| l.page);

            let ranges = std::iter::once(heading).chain(body.iter().copied());
            let rects = page_rects(ranges.map(|r| (r.row.start_line, r.row.end_line)), lines);

            debug!(
                "章节 {:?}: 正文 {} 行组, 行 {}..={}, {} 个矩形",
                heading.row.text,
                body.len(),
                start_line,
                end_line,
                rects.len()
            );

            sections.push(Section {
                heading: heading.row.text.clone(),
                text,
                level: heading.label,
                page: start_page.unwrap_or(heading.row.page),
                start_line,
                end_line,
                start_page,
                end_page,
                rects,
            });
        }

        sections
    }

    /// 大纲视图：文档标题 + H1/H2 列表
    pub fn outline(&self, rows: &[LabeledRow]) -> DocumentOutline {
        let title = rows
            .iter()
            .find(|r| r.label == Label::Title)
            .or_else(|| rows.iter().find(|r| r.label.is_heading()))
            .map(|r| r.row.text.clone())
            .unwrap_or_else(|| UNTITLED.to_string());

        let outline = rows
            .iter()
            .filter(|r| matches!(r.label, Label::H1 | Label::H2))
            .map(|r| OutlineEntry {
                level: r.label,
                text: r.row.text.clone(),
                page: r.row.page,
            })
            .collect();

        DocumentOutline { title, outline }
    }
}

impl Default for SectionReconstructor {
    fn default() -> Self {
        Self::new()
    }
}

/// 对给定行号区间内的物理行按页求并集矩形，页序按首次出现
fn page_rects(ranges: impl Iterator<Item = (usize, usize)>, lines: &[PhysicalLine]) -> Vec<PageRect> {
    let mut order: Vec<u32> = Vec::new();
    let mut boxes: HashMap<u32, BBox> = HashMap::new();

    for (start, end) in ranges {
        for index in start..=end {
            let Some(line) = lines.get(index) else {
                continue;
            };
            boxes
                .entry(line.page)
                .and_modify(|b| *b = b.union(&line.bbox))
                .or_insert_with(|| {
                    order.push(line.page);
                    line.bbox
                });
        }
    }

    order
        .into_iter()
        .map(|page| PageRect {
            page,
            bbox: boxes[&page].to_array(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::grouper::text_features;
    use crate::parser::GroupedRow;

    fn physical(index: usize, page: u32, bbox: BBox) -> PhysicalLine {
        PhysicalLine {
            index,
            page,
            text: format!("line {}", index),
            bbox,
        }
    }

    fn labeled(text: &str, label: Label, page: u32, start: usize, end: usize) -> LabeledRow {
        LabeledRow {
            row: GroupedRow {
                text: text.to_string(),
                font_size: 12.0,
                bold: label.is_heading(),
                italic: false,
                page,
                start_line: start,
                end_line: end,
                position_y: 0.0,
                y_gap: None,
                features: text_features(text),
            },
            label,
        }
    }

    fn lines_on_page_one(count: usize) -> Vec<PhysicalLine> {
        (0..count)
            .map(|i| physical(i, 1, BBox::new(72.0, 20.0 * i as f32, 200.0, 20.0 * i as f32 + 12.0)))
            .collect()
    }

    #[test]
    fn headings_collect_following_body_rows() {
        let lines = lines_on_page_one(6);
        let rows = vec![
            labeled("Report", Label::Title, 1, 0, 0),
            labeled("intro body", Label::None, 1, 1, 1),
            labeled("Methods", Label::H1, 1, 2, 2),
            labeled("first part", Label::None, 1, 3, 3),
            labeled("second part", Label::None, 1, 4, 4),
            labeled("Results", Label::H1, 1, 5, 5),
        ];
        let sections = SectionReconstructor::new().reconstruct(&rows, &lines);

        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].text, "Report intro body");
        assert_eq!(sections[1].heading, "Methods");
        assert_eq!(sections[1].text, "Methods first part second part");
        assert_eq!((sections[1].start_line, sections[1].end_line), (2, 4));
        assert_eq!(sections[2].text, "Results");
        assert_eq!((sections[2].start_line, sections[2].end_line), (5, 5));
        assert_eq!(sections[2].rects.len(), 1);
        assert_eq!(sections[1].rects[0].bbox, [72.0, 40.0, 200.0, 92.0]);
    }

    #[test]
    fn leading_body_rows_belong_to_no_section() {
        let lines = lines_on_page_one(3);
        let rows = vec![
            labeled("preamble", Label::None, 1, 0, 0),
            labeled("Scope", Label::H2, 1, 1, 1),
            labeled("details", Label::None, 1, 2, 2),
        ];
        let sections = SectionReconstructor::new().reconstruct(&rows, &lines);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].level, Label::H2);
        assert_eq!(sections[0].text, "Scope details");
    }

    #[test]
    fn section_spanning_two_pages_gets_two_tight_rects() {
        let lines = vec![
            physical(0, 1, BBox::new(72.0, 700.0, 300.0, 712.0)),
            physical(1, 1, BBox::new(60.0, 720.0, 280.0, 732.0)),
            physical(2, 2, BBox::new(80.0, 40.0, 250.0, 52.0)),
            physical(3, 2, BBox::new(72.0, 60.0, 320.0, 72.0)),
        ];
        let rows = vec![
            labeled("Chapter", Label::H1, 1, 0, 0),
            labeled("body one", Label::None, 1, 1, 1),
            labeled("body two", Label::None, 2, 2, 3),
        ];
        let sections = SectionReconstructor::new().reconstruct(&rows, &lines);
        assert_eq!(sections.len(), 1);
        let s = &sections[0];
        assert_eq!(s.start_page, Some(1));
        assert_eq!(s.end_page, Some(2));
        assert_eq!(
            s.rects,
            vec![
                PageRect {
                    page: 1,
                    bbox: [60.0, 700.0, 300.0, 732.0]
                },
                PageRect {
                    page: 2,
                    bbox: [72.0, 40.0, 320.0, 72.0]
                },
            ]
        );
    }

    #[test]
    fn outline_title_fallbacks() {
        let reconstructor = SectionReconstructor::new();

        let rows = vec![
            labeled("Intro", Label::H1, 1, 0, 0),
            labeled("Main Title", Label::Title, 1, 1, 1),
            labeled("Sub", Label::H2, 2, 2, 2),
        ];
        let outline = reconstructor.outline(&rows);
        assert_eq!(outline.title, "Main Title");
        assert_eq!(outline.outline.len(), 2);
        assert_eq!(outline.outline[1].page, 2);

        let rows = vec![labeled("text", Label::None, 1, 0, 0), labeled("First", Label::H2, 1, 1, 1)];
        assert_eq!(reconstructor.outline(&rows).title, "First");

        let rows = vec![labeled("text", Label::None, 1, 0, 0)];
        assert_eq!(reconstructor.outline(&rows).title, UNTITLED);
    }
}

//! 在 PDF 副本上添加高亮标注，原文件不做修改

use chrono::Utc;
use lopdf::{dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::parser::line_extractor::page_top;
use crate::parser::PageRect;
use crate::utils::files::derivative_filename;
use crate::utils::{DocsiftError, DocsiftResult};

/// 浅红色
const HIGHLIGHT_COLOR: [f32; 3] = [1.0, 0.6, 0.6];

pub const POSITIVE_PREFIX: &str = "annotated";
pub const NEGATIVE_PREFIX: &str = "annotatedNeg";

/// 一个被选中章节在某文档中的高亮区域
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedRegion {
    pub importance_rank: usize,
    pub rects: Vec<PageRect>,
}

pub struct PdfAnnotator {
    uploads_dir: PathBuf,
    prefix: String,
}

impl PdfAnnotator {
    pub fn new(uploads_dir: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            prefix: prefix.to_string(),
        }
    }

    /// 返回 原文件名 -> 标注副本文件名；没有任何有效矩形的文档不出现在结果中
    pub fn annotate(&self, selections: &BTreeMap<String, Vec<SelectedRegion>>) -> BTreeMap<String, String> {
        let mut annotated = BTreeMap::new();
        for (filename, regions) in selections {
            match self.annotate_document(filename, regions) {
                Ok(Some(derivative)) => {
                    annotated.insert(filename.clone(), derivative);
                }
                Ok(None) => debug!("{} 没有有效的高亮区域", filename),
                Err(e) => warn!("标注 {} 失败: {}", filename, e),
            }
        }
        annotated
    }

    pub fn annotate_document(&self, filename: &str, regions: &[SelectedRegion]) -> DocsiftResult<Option<String>> {
        let source = self.uploads_dir.join(filename);
        if !source.exists() {
            return Err(DocsiftError::Annotation(format!("源文件不存在: {}", source.display())));
        }

        let mut doc = Document::load(&source)?;
        let pages = doc.get_pages();
        let mut added = 0usize;

        for region in regions {
            for rect in &region.rects {
                let Some(&page_id) = pages.get(&rect.page) else {
                    warn!("跳过矩形: 第 {} 页不存在 ({})", rect.page, filename);
                    continue;
                };
                if !is_valid_bbox(&rect.bbox) {
                    warn!("跳过无效矩形 {:?} ({})", rect.bbox, filename);
                    continue;
                }
                match add_highlight(&mut doc, page_id, &rect.bbox) {
                    Ok(()) => added += 1,
                    Err(e) => warn!("第 {} 页添加高亮失败: {}", rect.page, e),
                }
            }
        }

        if added == 0 {
            return Ok(None);
        }

        let derivative = derivative_filename(&self.prefix, filename, Utc::now());
        doc.save(self.uploads_dir.join(&derivative))?;
        info!("已生成标注副本: {} ({} 处高亮)", derivative, added);
        Ok(Some(derivative))
    }
}

fn is_valid_bbox(bbox: &[f32; 4]) -> bool {
    bbox.iter().all(|v| v.is_finite()) && bbox[2] > bbox[0] && bbox[3] > bbox[1]
}

fn add_highlight(doc: &mut Document, page_id: ObjectId, bbox: &[f32; 4]) -> DocsiftResult<()> {
    // 左上角坐标系转回 PDF 用户空间
    let top = page_top(doc, page_id);
    let [x0, y0, x1, y1] = *bbox;
    let (bottom, upper) = (top - y1, top - y0);

    let color: Vec<Object> = HIGHLIGHT_COLOR.iter().map(|c| (*c).into()).collect();
    let annotation = dictionary! {
        "Type" => "Annot",
        "Subtype" => "Highlight",
        "Rect" => vec![x0.into(), bottom.into(), x1.into(), upper.into()],
        "QuadPoints" => vec![
            x0.into(), upper.into(), x1.into(), upper.into(),
            x0.into(), bottom.into(), x1.into(), bottom.into(),
        ],
        "C" => color,
        "CA" => 0.5,
        "F" => 4,
        "P" => page_id,
    };
    let annotation_id = doc.add_object(annotation);

    let existing = doc.get_dictionary(page_id)?.get(b"Annots").ok().cloned();
    match existing {
        Some(Object::Reference(array_id)) => {
            doc.get_object_mut(array_id)?
                .as_array_mut()?
                .push(Object::Reference(annotation_id));
        }
        Some(Object::Array(mut annotations)) => {
            annotations.push(Object::Reference(annotation_id));
            doc.get_dictionary_mut(page_id)?.set("Annots", annotations);
        }
        _ => {
            doc.get_dictionary_mut(page_id)?
                .set("Annots", vec![Object::Reference(annotation_id)]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::Stream;

    fn blank_pdf(path: &std::path::Path, pages: usize) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::new();
        for _ in 0..pages {
            let content = Content {
                operations: vec![Operation::new("BT", vec![]), Operation::new("ET", vec![])],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    fn annotation_rects(path: &std::path::Path) -> Vec<(u32, Vec<f32>)> {
        let doc = Document::load(path).unwrap();
        let mut found = Vec::new();
        for (number, page_id) in doc.get_pages() {
            let page = doc.get_dictionary(page_id).unwrap();
            let Ok(annots) = page.get(b"Annots").and_then(|a| a.as_array()) else {
                continue;
            };
            for annot in annots {
                let dict = doc.get_dictionary(annot.as_reference().unwrap()).unwrap();
                assert_eq!(dict.get(b"Subtype").unwrap().as_name().unwrap(), b"Highlight");
                let rect = dict
                    .get(b"Rect")
                    .unwrap()
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|o| o.as_float().unwrap())
                    .collect();
                found.push((number, rect));
            }
        }
        found
    }

    #[test]
    fn highlights_land_on_a_copy_in_pdf_space() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("report.pdf");
        blank_pdf(&source, 2);
        let original = std::fs::read(&source).unwrap();

        let mut selections = BTreeMap::new();
        selections.insert(
            "report.pdf".to_string(),
            vec![SelectedRegion {
                importance_rank: 1,
                rects: vec![
                    PageRect { page: 2, bbox: [72.0, 100.0, 300.0, 140.0] },
                    PageRect { page: 9, bbox: [72.0, 100.0, 300.0, 140.0] },
                    PageRect { page: 1, bbox: [50.0, 10.0, 40.0, 20.0] },
                ],
            }],
        );

        let annotator = PdfAnnotator::new(dir.path(), POSITIVE_PREFIX);
        let result = annotator.annotate(&selections);
        let derivative = &result["report.pdf"];
        assert!(derivative.starts_with("annotated_"));
        assert!(derivative.ends_with("_report.pdf"));

        assert_eq!(std::fs::read(&source).unwrap(), original);

        let rects = annotation_rects(&dir.path().join(derivative));
        assert_eq!(rects.len(), 1);
        assert_eq!(rects[0].0, 2);
        assert_eq!(rects[0].1, vec![72.0, 652.0, 300.0, 692.0]);
    }

    #[test]
    fn documents_without_valid_rects_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        blank_pdf(&dir.path().join("a.pdf"), 1);

        let mut selections = BTreeMap::new();
        selections.insert(
            "a.pdf".to_string(),
            vec![SelectedRegion {
                importance_rank: 1,
                rects: vec![PageRect { page: 1, bbox: [f32::NAN, 0.0, 10.0, 10.0] }],
            }],
        );
        selections.insert("missing.pdf".to_string(), vec![]);

        let result = PdfAnnotator::new(dir.path(), NEGATIVE_PREFIX).annotate(&selections);
        assert!(result.is_empty());
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn repeated_highlights_share_the_annots_array() {
        let dir = tempfile::tempdir().unwrap();
        blank_pdf(&dir.path().join("a.pdf"), 1);

        let regions = vec![
            SelectedRegion {
                importance_rank: 1,
                rects: vec![PageRect { page: 1, bbox: [10.0, 10.0, 100.0, 30.0] }],
            },
            SelectedRegion {
                importance_rank: 2,
                rects: vec![PageRect { page: 1, bbox: [10.0, 50.0, 100.0, 70.0] }],
            },
        ];
        let derivative = PdfAnnotator::new(dir.path(), POSITIVE_PREFIX)
            .annotate_document("a.pdf", &regions)
            .unwrap()
            .unwrap();
        assert_eq!(annotation_rects(&dir.path().join(derivative)).len(), 2);
    }
}

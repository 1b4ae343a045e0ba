mod common;

use std::sync::Arc;

use docsift::annotator::{PdfAnnotator, NEGATIVE_PREFIX, POSITIVE_PREFIX};
use docsift::classifier::HeuristicClassifier;
use docsift::config::RankingConfig;
use docsift::embedder::{CachedEmbedder, HashingEmbedder};
use docsift::parser::ExtractionPipeline;
use docsift::ranking::{Candidate, QueryService};
use docsift::storage::Database;

#[tokio::test]
async fn ranked_sections_are_highlighted_on_a_copy() {
    let dir = tempfile::tempdir().unwrap();
    let filename = "1700000000_guide.pdf";
    let path = dir.path().join(filename);
    common::write_travel_guide(&path);
    let original = std::fs::read(&path).unwrap();

    let document = ExtractionPipeline::new().process(&path, &HeuristicClassifier::default());
    let candidates: Vec<Candidate> = document
        .sections
        .iter()
        .map(|s| Candidate::from_section(filename, s))
        .collect();

    let embedder = Arc::new(CachedEmbedder::new(HashingEmbedder::new(384), 10));
    let service = QueryService::new(embedder, &RankingConfig::default());
    let documents = vec![filename.to_string()];
    let mut output = service
        .persona_query("Hiker", "mountain trails and alpine lakes", &documents, &candidates, Some(2))
        .await
        .unwrap();

    assert_eq!(output.extracted_sections.len(), 2);
    assert_eq!(output.extracted_sections[0].section_title, "2. Mountain Hiking");
    assert_eq!(output.extracted_sections[0].rects.len(), 2);
    assert_eq!(output.metadata.job_to_be_done.as_deref(), Some("mountain trails and alpine lakes"));

    let annotator = PdfAnnotator::new(dir.path(), POSITIVE_PREFIX);
    output.metadata.annotated_files = annotator.annotate(&output.selected_regions());
    let derivative = &output.metadata.annotated_files[filename];
    assert!(derivative.starts_with("annotated_"));
    assert!(dir.path().join(derivative).exists());
    assert_eq!(std::fs::read(&path).unwrap(), original);

    // 标注副本仍可被重新解析，文本不变
    let reparsed = ExtractionPipeline::new().analyze(&dir.path().join(derivative));
    let source = ExtractionPipeline::new().analyze(&path);
    assert_eq!(reparsed.lines, source.lines);
}

#[tokio::test]
async fn contradiction_output_only_holds_negative_sections() {
    let dir = tempfile::tempdir().unwrap();
    let filename = "guide.pdf";
    let path = dir.path().join(filename);
    common::write_travel_guide(&path);

    let document = ExtractionPipeline::new().process(&path, &HeuristicClassifier::default());
    let candidates: Vec<Candidate> = document
        .sections
        .iter()
        .map(|s| Candidate::from_section(filename, s))
        .collect();

    let service = QueryService::new(Arc::new(HashingEmbedder::new(64)), &RankingConfig::default());
    let mut output = service
        .contradiction_query("fresh fish", &[filename.to_string()], &candidates)
        .await
        .unwrap();

    for (rank, section) in output.extracted_sections.iter().enumerate() {
        assert!(section.similarity < 0.0);
        assert_eq!(section.importance_rank, rank + 1);
    }

    let annotated = PdfAnnotator::new(dir.path(), NEGATIVE_PREFIX).annotate(&output.selected_regions());
    assert_eq!(annotated.len(), usize::from(!output.extracted_sections.is_empty()));
    if let Some(name) = annotated.get(filename) {
        assert!(name.starts_with("annotatedNeg_"));
    }
    output.metadata.annotated_files = annotated;
    let json = serde_json::to_value(&output).unwrap();
    assert!(json["metadata"]["selected_text"].is_string());
    assert!(json["metadata"].get("persona").is_none());
}

#[tokio::test]
async fn stored_documents_feed_queries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("guide.pdf");
    common::write_travel_guide(&path);
    let document = ExtractionPipeline::new().process(&path, &HeuristicClassifier::default());

    let url = format!("sqlite:{}", dir.path().join("docsift.db").display());
    let db = Database::new(&url).await.unwrap();
    db.init_schema().await.unwrap();
    db.save_document("guide.pdf", "guide.pdf", &document).await.unwrap();

    let stored = db.get_document("guide.pdf").await.unwrap().unwrap();
    assert_eq!(stored.outline().unwrap(), document.outline);
    let sections = stored.sections().unwrap();
    assert_eq!(sections, document.sections);

    let candidates: Vec<Candidate> = sections
        .iter()
        .map(|s| Candidate::from_section(&stored.filename, s))
        .collect();
    let service = QueryService::new(Arc::new(HashingEmbedder::new(128)), &RankingConfig::default());
    let output = service
        .text_query("regional dishes", &[stored.filename.clone()], &candidates, None)
        .await
        .unwrap();
    assert_eq!(output.positive.extracted_sections.len(), 4);
    assert_eq!(output.positive.extracted_sections[0].section_title, "3. Local Cuisine");

    let json = serde_json::to_string(&output).unwrap();
    db.save_query_run("text", "regional dishes", &json).await.unwrap();
    assert_eq!(db.recent_query_runs(5).await.unwrap().len(), 1);
}

use crate::domain::models::{ContextDocument, ExtractionResult, ExtractionStatus};
use chrono::SecondsFormat;
use log::debug;

fn status_label(status: &ExtractionStatus) -> String {
    match status {
        ExtractionStatus::Ok => "OK".to_string(),
        ExtractionStatus::Failed { kind, .. } => format!("FAILED: {}", kind),
        ExtractionStatus::SkippedUnsupported { .. } => "FAILED: Unsupported".to_string(),
    }
}

fn section_body(result: &ExtractionResult) -> &str {
    match &result.status {
        ExtractionStatus::Ok => &result.text,
        ExtractionStatus::Failed { reason, .. } => reason,
        ExtractionStatus::SkippedUnsupported { reason } => reason,
    }
}

/// Renders the single text artifact: header block, then one section per file.
pub fn format_document(doc: &ContextDocument) -> String {
    debug!("Formatting context document with {} sections", doc.results.len());
    let stats = &doc.stats;
    let mut result = String::new();

    result.push_str("=== CONTEXT EXPORT ===\n");
    result.push_str(&format!(
        "Generated: {}\n",
        doc.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    result.push_str(&format!(
        "Files: {} | Selected bytes: {} | Failed: {}\n",
        stats.file_count, stats.selected_bytes, stats.failed
    ));
    result.push_str(&format!(
        "Extracted bytes: {} | Text: {} | Documents: {} | Skipped: {}\n",
        stats.extracted_bytes,
        stats.by_classification.text,
        stats.by_classification.documents(),
        stats.by_classification.skipped
    ));

    for section in &doc.results {
        result.push('\n');
        result.push_str(&format!(
            "--- FILE: {} [{}] ---\n",
            section.display_path,
            status_label(&section.status)
        ));
        let body = section_body(section);
        result.push_str(body);
        if !body.is_empty() && !body.ends_with('\n') {
            result.push('\n');
        }
    }

    result
}

/// One-line outcome used by the status bar and the terminal summary.
pub fn summarize(doc: &ContextDocument) -> String {
    let stats = &doc.stats;
    let mut line = format!(
        "Exported {} files ({} bytes of text)",
        stats.file_count, stats.extracted_bytes
    );
    if stats.failed > 0 {
        line.push_str(&format!(", {} failed", stats.failed));
    }
    line
}

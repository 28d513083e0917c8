use super::DocumentAdapter;
use crate::domain::errors::ExtractionError;
use log::warn;
use std::panic;

/// Page text of a PDF in page order, each page under a `Page <n>:` marker.
pub struct PdfAdapter;

impl DocumentAdapter for PdfAdapter {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        if !bytes.starts_with(b"%PDF") {
            return Err(ExtractionError::Corrupt(
                "missing %PDF header".to_string(),
            ));
        }

        // The decoder can panic on hostile input; treat that as a corrupt file.
        let pages = match panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => return Err(classify_failure(bytes, e.to_string())),
            Err(_) => {
                warn!("PDF decoder panicked; reporting document as corrupt");
                return Err(ExtractionError::Corrupt("PDF decoder aborted".to_string()));
            }
        };

        Ok(render_pages(&pages))
    }
}

fn classify_failure(bytes: &[u8], message: String) -> ExtractionError {
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("encrypt") || lowered.contains("password") || has_encrypt_dictionary(bytes)
    {
        ExtractionError::PasswordProtected(message)
    } else {
        ExtractionError::Corrupt(message)
    }
}

fn has_encrypt_dictionary(bytes: &[u8]) -> bool {
    bytes.windows(b"/Encrypt".len()).any(|w| w == b"/Encrypt")
}

fn render_pages(pages: &[String]) -> String {
    let mut blocks = Vec::new();
    for (index, text) in pages.iter().enumerate() {
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let marker = format!("Page {}:", index + 1);
        blocks.push(format!("{}\n{}\n{}", marker, "-".repeat(marker.len() + 1), text));
    }
    blocks.join("\n\n")
}

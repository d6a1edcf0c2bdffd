use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use roxmltree::Document;
use zip::ZipArchive;

use super::normalize_text;
use crate::models::{SourceDocument, SourceType};

/// Reads `word/document.xml` and groups body paragraphs under the most recent
/// heading-styled paragraph.
pub fn extract_docx_documents(
    path: &Path,
    relative_path: &str,
    title: &str,
    source_hash: &str,
) -> Result<Vec<SourceDocument>> {
    let file =
        File::open(path).with_context(|| format!("failed to open DOCX: {}", path.display()))?;
    let mut archive = ZipArchive::new(file).context("DOCX is not a valid ZIP archive")?;

    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .context("DOCX missing word/document.xml")?
        .read_to_string(&mut document_xml)
        .context("failed to read word/document.xml")?;

    let doc = Document::parse(&document_xml).context("failed to parse DOCX XML")?;

    let mut documents = Vec::new();
    let mut section: Option<String> = None;
    let mut paragraphs: Vec<String> = Vec::new();

    let mut flush = |section: &Option<String>, paragraphs: &mut Vec<String>| {
        if paragraphs.is_empty() {
            return;
        }
        documents.push(SourceDocument {
            path: relative_path.to_string(),
            title: title.to_string(),
            kind: SourceType::DocxText,
            section: section.clone(),
            page: None,
            content: paragraphs.join(" "),
            source_hash: source_hash.to_string(),
        });
        paragraphs.clear();
    };

    for paragraph in doc
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "p")
    {
        let style = paragraph
            .descendants()
            .find(|node| node.is_element() && node.tag_name().name() == "pStyle")
            .and_then(|node| {
                node.attributes()
                    .find(|attr| attr.name().ends_with("val"))
                    .map(|attr| attr.value().to_string())
            });

        let text = paragraph
            .descendants()
            .filter(|node| node.is_element() && node.tag_name().name() == "t")
            .filter_map(|node| node.text())
            .collect::<Vec<_>>()
            .join("");

        let normalized = normalize_text(&text);
        if normalized.is_empty() {
            continue;
        }

        let is_heading = style
            .as_ref()
            .map(|style| {
                let lower = style.to_ascii_lowercase();
                lower.contains("heading") || lower == "title"
            })
            .unwrap_or(false);

        if is_heading {
            flush(&section, &mut paragraphs);
            section = Some(normalized);
            continue;
        }

        paragraphs.push(normalized);
    }
    flush(&section, &mut paragraphs);

    Ok(documents)
}

pub mod docx;
pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use sha2::{Digest, Sha256};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::models::{Chunk, SourceDocument, SourceType};

/// Walks `folder` and returns every supported file as cleaned text.
///
/// Text and markdown files are read directly, `.docx` files are split at
/// heading paragraphs and `.pdf` files yield one document per page when poppler
/// is installed. Documents that clean down to nothing are dropped.
pub async fn get_cleaned_documents(folder: &Path) -> Result<Vec<SourceDocument>> {
    if !folder.is_dir() {
        anyhow::bail!("document folder does not exist: {}", folder.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(folder).follow_links(true).sort_by_file_name() {
        let entry = entry
            .with_context(|| format!("failed walking document folder {}", folder.display()))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    let mut documents = Vec::new();
    for path in files {
        let Some(kind) = source_type_for(&path) else {
            tracing::debug!("skipping unsupported file {}", path.display());
            continue;
        };

        let source_hash = file_sha256(&path).await?;
        let relative = path
            .strip_prefix(folder)
            .unwrap_or(&path)
            .display()
            .to_string();
        let title = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("untitled")
            .to_string();

        let extracted = match kind {
            SourceType::PlainText => {
                let raw = read_text(&path).await?;
                vec![SourceDocument {
                    path: relative,
                    title,
                    kind,
                    section: None,
                    page: None,
                    content: clean_text(&raw),
                    source_hash,
                }]
            }
            SourceType::Markdown => {
                let raw = read_text(&path).await?;
                split_markdown_sections(&raw)
                    .into_iter()
                    .map(|(section, body)| SourceDocument {
                        path: relative.clone(),
                        title: title.clone(),
                        kind,
                        section,
                        page: None,
                        content: clean_text(&body),
                        source_hash: source_hash.clone(),
                    })
                    .collect()
            }
            SourceType::DocxText => {
                let docx_path = path.clone();
                tokio::task::spawn_blocking(move || {
                    docx::extract_docx_documents(&docx_path, &relative, &title, &source_hash)
                })
                .await
                .context("DOCX extraction task panicked")??
            }
            SourceType::PdfText => {
                pdf::extract_pdf_documents(&path, &relative, &title, &source_hash).await?
            }
        };

        let before = documents.len();
        documents.extend(extracted.into_iter().filter(|doc| !doc.content.is_empty()));
        tracing::debug!(
            "loaded {} document(s) from {}",
            documents.len() - before,
            path.display()
        );
    }

    if documents.is_empty() {
        anyhow::bail!("no documents found in {}", folder.display());
    }

    Ok(documents)
}

/// Splits documents into word windows of `target_tokens` words, stepping by
/// `target_tokens - overlap_tokens`.
pub fn chunk_documents(
    documents: &[SourceDocument],
    target_tokens: usize,
    overlap_tokens: usize,
) -> Vec<Chunk> {
    let target_tokens = target_tokens.max(1);
    let step = target_tokens.saturating_sub(overlap_tokens).max(1);
    let mut chunks = Vec::new();

    for document in documents {
        let tokens: Vec<&str> = document.content.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        let mut start = 0;
        loop {
            let end = (start + target_tokens).min(tokens.len());
            chunks.push(Chunk {
                id: Uuid::new_v4().to_string(),
                content: tokens[start..end].join(" "),
                kind: document.kind,
                source_path: document.path.clone(),
                title: document.title.clone(),
                section: document.section.clone(),
                page: document.page,
                token_count: (end - start) as i64,
                source_hash: document.source_hash.clone(),
            });

            if end == tokens.len() {
                break;
            }
            start += step;
        }
    }

    chunks
}

/// Stable fingerprint of the loaded corpus, used in index manifests.
pub fn corpus_hash(documents: &[SourceDocument]) -> String {
    let mut pairs: Vec<(&str, &str)> = documents
        .iter()
        .map(|doc| (doc.path.as_str(), doc.source_hash.as_str()))
        .collect();
    pairs.sort_unstable();
    pairs.dedup();

    let mut hasher = Sha256::new();
    for (path, hash) in pairs {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(hash.as_bytes());
        hasher.update([b'\n']);
    }
    format!("{:x}", hasher.finalize())
}

/// Drops page furniture lines and normalizes whitespace and typographic quotes.
pub fn clean_text(raw: &str) -> String {
    let page_marker = Regex::new(r"(?i)^(page\s+)?\d{1,4}(\s+(of|/)\s+\d{1,4})?$")
        .unwrap_or_else(|_| Regex::new("$^").unwrap());

    let kept = raw
        .lines()
        .map(str::trim)
        .filter(|line| !page_marker.is_match(line))
        .collect::<Vec<_>>()
        .join("\n");

    normalize_text(&kept)
}

pub fn normalize_text(input: &str) -> String {
    input
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{00A0}', '\u{200B}'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn source_type_for(path: &Path) -> Option<SourceType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "txt" | "text" => Some(SourceType::PlainText),
        "md" | "markdown" => Some(SourceType::Markdown),
        "docx" => Some(SourceType::DocxText),
        "pdf" => Some(SourceType::PdfText),
        _ => None,
    }
}

/// Returns `(heading, body)` pairs; text before the first heading has no heading.
fn split_markdown_sections(raw: &str) -> Vec<(Option<String>, String)> {
    let mut sections = Vec::new();
    let mut heading: Option<String> = None;
    let mut body = String::new();

    for line in raw.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            let title = trimmed.trim_start_matches('#').trim();
            if !body.trim().is_empty() {
                sections.push((heading.take(), std::mem::take(&mut body)));
            }
            body.clear();
            heading = (!title.is_empty()).then(|| normalize_text(title));
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }

    if !body.trim().is_empty() {
        sections.push((heading, body));
    }

    sections
}

async fn read_text(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed reading {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

async fn file_sha256(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed reading file for hash: {}", path.display()))?;

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(content: String) -> SourceDocument {
        SourceDocument {
            path: "prep.txt".to_string(),
            title: "prep".to_string(),
            kind: SourceType::PlainText,
            section: Some("Fasting".to_string()),
            page: None,
            content,
            source_hash: "h".to_string(),
        }
    }

    #[test]
    fn chunking_splits_long_text_with_overlap() {
        let content = (1..=120)
            .map(|n| format!("word{n}"))
            .collect::<Vec<_>>()
            .join(" ");

        let chunks = chunk_documents(&[document(content)], 50, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].section.as_deref(), Some("Fasting"));
        assert!(chunks[0].content.ends_with("word50"));
        assert!(chunks[1].content.starts_with("word41"));
        assert!(chunks[2].content.ends_with("word120"));
        assert!(chunks.iter().all(|c| c.token_count > 0));
    }

    #[test]
    fn short_documents_stay_single_chunk() {
        let chunks = chunk_documents(&[document("Drink clear fluids only.".to_string())], 10, 2);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_count, 4);
    }

    #[test]
    fn overlap_larger_than_window_still_advances() {
        let content = "a b c d e f".to_string();
        let chunks = chunk_documents(&[document(content)], 2, 5);
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks.last().map(|c| c.content.as_str()), Some("e f"));
    }

    #[test]
    fn clean_text_drops_page_numbers_and_smart_quotes() {
        let raw = "Don\u{2019}t eat solid food.\n  12  \nPage 3 of 10\n\u{201C}Clear\u{201D} fluids are fine.";
        assert_eq!(
            clean_text(raw),
            "Don't eat solid food. \"Clear\" fluids are fine."
        );
    }

    #[test]
    fn markdown_headings_become_sections() {
        let raw = "Intro line\n# Before\nFast for 8 hours.\n## After\nEat light meals.\n";
        let sections = split_markdown_sections(raw);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].0, None);
        assert_eq!(sections[1].0.as_deref(), Some("Before"));
        assert_eq!(sections[2].0.as_deref(), Some("After"));
        assert!(sections[2].1.contains("Eat light meals."));
    }

    #[test]
    fn corpus_hash_ignores_document_order() {
        let mut a = document("x".to_string());
        a.path = "a.txt".to_string();
        let mut b = document("y".to_string());
        b.path = "b.txt".to_string();
        b.source_hash = "other".to_string();

        assert_eq!(
            corpus_hash(&[a.clone(), b.clone()]),
            corpus_hash(&[b, a])
        );
    }

    #[tokio::test]
    async fn loads_supported_files_from_folder() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fasting.txt"), "Stop solids 6-8 hours before.\n1\n").unwrap();
        std::fs::create_dir(dir.path().join("aftercare")).unwrap();
        std::fs::write(
            dir.path().join("aftercare/recovery.md"),
            "# Diet\nSoup and toast for 24 hours.\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("scan.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(dir.path().join("empty.txt"), "   \n").unwrap();

        let documents = get_cleaned_documents(dir.path()).await.unwrap();
        assert_eq!(documents.len(), 2);

        let recovery = documents
            .iter()
            .find(|doc| doc.kind == SourceType::Markdown)
            .unwrap();
        assert_eq!(recovery.section.as_deref(), Some("Diet"));
        assert_eq!(recovery.title, "recovery");
        assert!(recovery.path.ends_with("recovery.md"));

        let fasting = documents
            .iter()
            .find(|doc| doc.kind == SourceType::PlainText)
            .unwrap();
        assert_eq!(fasting.content, "Stop solids 6-8 hours before.");
        assert_eq!(fasting.source_hash.len(), 64);
    }

    #[tokio::test]
    async fn empty_or_missing_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = get_cleaned_documents(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("no documents found"));

        let err = get_cleaned_documents(&dir.path().join("nope"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unreadable_entry_fails_the_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fasting.txt"), "Stop solids 6-8 hours before.").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.txt"), dir.path().join("leaflet.txt"))
            .unwrap();

        let err = get_cleaned_documents(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("failed walking document folder"));
    }
}

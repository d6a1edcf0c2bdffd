use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::process::Command;

use super::clean_text;
use crate::models::{SourceDocument, SourceType};

/// One document per page via poppler's `pdftotext`, falling back to a single
/// whole-file document from `pdf-extract` when poppler is missing or yields nothing.
pub async fn extract_pdf_documents(
    pdf_path: &Path,
    relative_path: &str,
    title: &str,
    source_hash: &str,
) -> Result<Vec<SourceDocument>> {
    let document = |page: Option<i64>, content: String| SourceDocument {
        path: relative_path.to_string(),
        title: title.to_string(),
        kind: SourceType::PdfText,
        section: None,
        page,
        content,
        source_hash: source_hash.to_string(),
    };

    let mut documents = Vec::new();

    if has_command("pdftotext").await {
        let page_count = get_pdf_page_count(pdf_path).await.unwrap_or(0);
        for page in 1..=page_count {
            let output = Command::new("pdftotext")
                .arg("-f")
                .arg(page.to_string())
                .arg("-l")
                .arg(page.to_string())
                .arg("-layout")
                .arg("-nopgbrk")
                .arg(pdf_path)
                .arg("-")
                .output()
                .await
                .with_context(|| format!("failed to run pdftotext for page {}", page))?;

            if !output.status.success() {
                tracing::warn!("pdftotext failed on page {} of {}", page, pdf_path.display());
                continue;
            }

            let content = clean_text(&String::from_utf8_lossy(&output.stdout));
            if content.is_empty() {
                continue;
            }

            documents.push(document(Some(page as i64), content));
        }
    }

    if documents.is_empty() {
        let path = pdf_path.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path))
            .await
            .context("PDF extraction task panicked")?
            .with_context(|| format!("failed to extract text from PDF: {}", pdf_path.display()))?;

        let content = clean_text(&extracted);
        if !content.is_empty() {
            documents.push(document(None, content));
        }
    }

    Ok(documents)
}

async fn get_pdf_page_count(pdf_path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .output()
        .await
        .context("failed to run pdfinfo")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("pdfinfo exited with non-zero status"));
    }

    parse_page_count(&String::from_utf8_lossy(&output.stdout))
}

fn parse_page_count(pdfinfo_stdout: &str) -> Result<usize> {
    let regex = Regex::new(r"(?m)^Pages:\s+(\d+)\s*$")?;
    regex
        .captures(pdfinfo_stdout)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .ok_or_else(|| anyhow::anyhow!("unable to parse page count from pdfinfo"))
}

async fn has_command(binary: &str) -> bool {
    // pdfinfo/pdftotext exit non-zero on --version, so probe PATH instead.
    Command::new("which")
        .arg(binary)
        .output()
        .await
        .map(|out| out.status.success() && !out.stdout.is_empty())
        .unwrap_or(false)
}

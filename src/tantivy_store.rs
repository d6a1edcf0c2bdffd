use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index};

use crate::models::Chunk;

#[derive(Clone)]
pub struct TantivyStore {
    index_dir: PathBuf,
}

#[derive(Clone, Copy)]
struct TantivyFields {
    chunk_id: Field,
    content: Field,
    title: Field,
    section: Field,
}

impl TantivyStore {
    pub fn new(index_dir: PathBuf) -> Self {
        Self { index_dir }
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn exists(&self) -> bool {
        self.index_dir.join("meta.json").exists()
    }

    pub fn rebuild(&self, chunks: &[Chunk]) -> Result<()> {
        let at = || format!("failed rebuilding tantivy index at {}", self.index_dir.display());

        if self.index_dir.exists() {
            std::fs::remove_dir_all(&self.index_dir).with_context(at)?;
        }
        std::fs::create_dir_all(&self.index_dir).with_context(at)?;

        let (schema, fields) = build_schema();
        let index = Index::create_in_dir(&self.index_dir, schema).with_context(at)?;
        let mut writer = index.writer(50_000_000).with_context(at)?;

        for chunk in chunks {
            writer.add_document(doc!(
                fields.chunk_id => chunk.id.clone(),
                fields.content => chunk.content.clone(),
                fields.title => chunk.title.clone(),
                fields.section => chunk.section.clone().unwrap_or_default(),
            ))?;
        }

        writer.commit()?;
        Ok(())
    }

    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        if !self.exists() || limit == 0 {
            return Ok(vec![]);
        }

        let index = Index::open_in_dir(&self.index_dir)?;
        let schema = index.schema();
        let fields = resolve_fields(&schema)?;
        let reader = index.reader()?;
        let searcher = reader.searcher();

        // Lenient parsing: patient questions carry '?', quotes and colons.
        let query_parser =
            QueryParser::for_index(&index, vec![fields.content, fields.title, fields.section]);
        let (query, _errors) = query_parser.parse_query_lenient(query);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut out = Vec::with_capacity(top_docs.len());
        for (score, addr) in top_docs {
            let doc = searcher.doc::<tantivy::schema::TantivyDocument>(addr)?;
            if let Some(chunk_id) = doc
                .get_first(fields.chunk_id)
                .and_then(|value| value.as_str())
            {
                out.push((chunk_id.to_string(), score));
            }
        }

        Ok(out)
    }
}

fn build_schema() -> (Schema, TantivyFields) {
    let mut builder = Schema::builder();

    let chunk_id = builder.add_text_field("chunk_id", STRING | STORED);
    let content = builder.add_text_field("content", TEXT | STORED);
    let title = builder.add_text_field("title", TEXT | STORED);
    let section = builder.add_text_field("section", TEXT | STORED);

    (
        builder.build(),
        TantivyFields {
            chunk_id,
            content,
            title,
            section,
        },
    )
}

fn resolve_fields(schema: &Schema) -> Result<TantivyFields> {
    let field = |name: &str| {
        schema
            .get_field(name)
            .map_err(|err| anyhow::anyhow!(err.to_string()))
    };

    Ok(TantivyFields {
        chunk_id: field("chunk_id")?,
        content: field("content")?,
        title: field("title")?,
        section: field("section")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn chunk(id: &str, content: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: content.to_string(),
            kind: SourceType::PlainText,
            source_path: "notes.txt".to_string(),
            title: "notes".to_string(),
            section: None,
            page: None,
            token_count: content.split_whitespace().count() as i64,
            source_hash: "h".to_string(),
        }
    }

    #[test]
    fn search_finds_lexical_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = TantivyStore::new(dir.path().join("tantivy"));
        store
            .rebuild(&[
                chunk("a", "Stop eating solid food eight hours before the endoscopy."),
                chunk("b", "Sedation wears off within a few hours after the procedure."),
            ])
            .unwrap();

        let hits = store.search("Can I eat solid food?", 5).unwrap();
        assert_eq!(hits.first().map(|(id, _)| id.as_str()), Some("a"));
    }

    #[test]
    fn rebuild_error_names_index_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tantivy");
        std::fs::write(&path, "not a directory").unwrap();

        let err = TantivyStore::new(path.clone())
            .rebuild(&[chunk("a", "clear fluids only")])
            .unwrap_err();
        assert!(err
            .to_string()
            .contains(&format!("failed rebuilding tantivy index at {}", path.display())));
    }

    #[test]
    fn missing_index_returns_no_hits() {
        let dir = tempfile::tempdir().unwrap();
        let store = TantivyStore::new(dir.path().join("absent"));
        assert!(store.search("sedation", 5).unwrap().is_empty());
    }
}

//! Hash-guarded document upsert.
//!
//! A document is keyed by `(project, file)`. When the body hash matches the
//! stored one nothing is written and the outcome is [`Materialized::Skipped`].
//! Otherwise the document is inserted or updated in place and its whole
//! fragment set is replaced by a fresh run of the chunker.

use anyhow::Result;
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::hash::hash_text;
use crate::models::{Document, Fragment};
use crate::store::StoreTx;

/// Chunking and embedding-slot settings applied to every fragment.
#[derive(Debug, Clone)]
pub struct FragmentSettings {
    pub max_chars: usize,
    pub overlap_chars: usize,
    pub embedding_model: String,
}

impl Default for FragmentSettings {
    fn default() -> Self {
        Self {
            max_chars: 6000,
            overlap_chars: 300,
            embedding_model: "nomic-embed-text".to_string(),
        }
    }
}

/// What to materialize.
#[derive(Debug, Clone)]
pub struct DocumentInput<'a> {
    pub project_id: &'a str,
    pub file_id: &'a str,
    pub title: &'a str,
    pub doc_type: &'a str,
    pub body: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    Ingested { document_id: String, fragments: usize },
    Skipped { document_id: String },
}

impl Materialized {
    pub fn document_id(&self) -> &str {
        match self {
            Materialized::Ingested { document_id, .. } | Materialized::Skipped { document_id } => {
                document_id
            }
        }
    }
}

pub async fn materialize(
    tx: &mut dyn StoreTx,
    settings: &FragmentSettings,
    input: &DocumentInput<'_>,
    now: i64,
) -> Result<Materialized> {
    let content_hash = hash_text(input.body);

    let existing = tx.find_document(input.project_id, input.file_id).await?;
    if let Some(existing) = &existing {
        if existing.content_hash == content_hash {
            return Ok(Materialized::Skipped {
                document_id: existing.id.clone(),
            });
        }
    }

    let doc = Document {
        id: existing
            .map(|d| d.id)
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        project_id: input.project_id.to_string(),
        file_id: input.file_id.to_string(),
        doc_type: input.doc_type.to_string(),
        title: input.title.to_string(),
        body: input.body.to_string(),
        content_hash,
        created_at: now,
        updated_at: now,
    };
    let document_id = tx.upsert_document(&doc).await?;

    let fragments: Vec<Fragment> = chunk_text(input.body, settings.max_chars, settings.overlap_chars)
        .into_iter()
        .enumerate()
        .map(|(i, text)| make_fragment(&document_id, input.project_id, i as i64, text, settings))
        .collect();
    tx.replace_fragments(&document_id, &fragments).await?;

    Ok(Materialized::Ingested {
        document_id,
        fragments: fragments.len(),
    })
}

fn make_fragment(
    document_id: &str,
    project_id: &str,
    index: i64,
    text: String,
    settings: &FragmentSettings,
) -> Fragment {
    Fragment {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        project_id: project_id.to_string(),
        section_label: String::new(),
        fragment_index: index,
        hash: hash_text(&text),
        text,
        metadata: serde_json::json!({ "v": 0 }),
        embedding: None,
        embedding_model: settings.embedding_model.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::reassemble;
    use crate::store::memory::InMemoryStore;
    use crate::store::Store;

    fn input<'a>(body: &'a str) -> DocumentInput<'a> {
        DocumentInput {
            project_id: "p1",
            file_id: "f1",
            title: "notes",
            doc_type: "md",
            body,
        }
    }

    fn small() -> FragmentSettings {
        FragmentSettings {
            max_chars: 16,
            overlap_chars: 4,
            ..FragmentSettings::default()
        }
    }

    #[tokio::test]
    async fn identical_body_is_skipped() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let first = materialize(tx.as_mut(), &small(), &input("same body"), 1).await.unwrap();
        let second = materialize(tx.as_mut(), &small(), &input("same body"), 2).await.unwrap();
        assert!(matches!(first, Materialized::Ingested { fragments: 1, .. }));
        assert_eq!(
            second,
            Materialized::Skipped {
                document_id: first.document_id().to_string()
            }
        );
    }

    #[tokio::test]
    async fn changed_body_replaces_in_place() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let body = "The party crossed the river at dawn and made camp by the old mill.";
        let first = materialize(tx.as_mut(), &small(), &input(body), 1).await.unwrap();
        let second = materialize(tx.as_mut(), &small(), &input("short now"), 2).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.document_id(), second.document_id());
        let docs = store.list_documents("p1").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].body, "short now");
        assert_eq!(docs[0].content_hash, hash_text("short now"));

        let fragments = store.list_fragments(first.document_id()).await.unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].text, "short now");
        assert_eq!(store.fragment_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn fragments_reconstruct_trimmed_body() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let body = "\n  The party crossed the river at dawn and made camp by the old mill.\n\n";
        let done = materialize(tx.as_mut(), &small(), &input(body), 1).await.unwrap();
        tx.commit().await.unwrap();

        let fragments = store.list_fragments(done.document_id()).await.unwrap();
        assert!(fragments.len() > 1);
        for (i, f) in fragments.iter().enumerate() {
            assert_eq!(f.fragment_index, i as i64);
            assert_eq!(f.section_label, "");
            assert_eq!(f.project_id, "p1");
            assert_eq!(f.metadata, serde_json::json!({ "v": 0 }));
            assert!(f.embedding.is_none());
        }
        let texts: Vec<String> = fragments.into_iter().map(|f| f.text).collect();
        assert_eq!(reassemble(&texts, 4), body.trim());
    }
}

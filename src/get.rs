//! Document retrieval by ID.
//!
//! Fetches a document and its ordered fragments through the [`Store`].
//! Used by the `kbsync get` CLI command.

use anyhow::{bail, Result};
use serde::Serialize;

use kbsync_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub project_id: String,
    pub file_id: String,
    pub doc_type: String,
    pub title: String,
    pub content_hash: String,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
    pub body: String,
    pub fragments: Vec<FragmentResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FragmentResponse {
    pub index: i64,
    pub section_label: String,
    pub hash: String,
    pub embedding_model: String,
    pub embedded: bool,
    pub text: String,
}

pub async fn get_document(store: &dyn Store, id: &str) -> Result<DocumentResponse> {
    let doc = match store.get_document(id).await? {
        Some(doc) => doc,
        None => bail!("document not found: {}", id),
    };

    let fragments = store
        .list_fragments(id)
        .await?
        .into_iter()
        .map(|f| FragmentResponse {
            index: f.fragment_index,
            section_label: f.section_label,
            hash: f.hash,
            embedding_model: f.embedding_model,
            embedded: f.embedding.is_some(),
            text: f.text,
        })
        .collect();

    Ok(DocumentResponse {
        id: doc.id,
        project_id: doc.project_id,
        file_id: doc.file_id,
        doc_type: doc.doc_type,
        title: doc.title,
        content_hash: doc.content_hash,
        created_at: format_ts_iso(doc.created_at),
        updated_at: format_ts_iso(doc.updated_at),
        body: doc.body,
        fragments,
    })
}

/// CLI entry point: prints the document, or its JSON form with `json`.
pub async fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let doc = get_document(&store, id).await;
    pool.close().await;
    let doc = doc?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("--- Document ---");
    println!("id:           {}", doc.id);
    println!("title:        {}", doc.title);
    println!("type:         {}", doc.doc_type);
    println!("file_id:      {}", doc.file_id);
    println!("content_hash: {}", doc.content_hash);
    println!("created_at:   {}", doc.created_at);
    println!("updated_at:   {}", doc.updated_at);
    println!();

    println!("--- Body ---");
    println!("{}", doc.body);
    println!();

    println!("--- Fragments ({}) ---", doc.fragments.len());
    for fragment in &doc.fragments {
        println!("[fragment {}]", fragment.index);
        println!("{}", fragment.text);
        println!();
    }

    Ok(())
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

//! Document retrieval by slug.
//!
//! Fetches the stored document and reports whether the listing index
//! currently carries an entry for it. Used by the `press get` command.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::index::ListingIndexStore;
use crate::models::{Document, IndexEntry};
use crate::store::DocumentStore;

/// A stored document together with its current listing state.
#[derive(Debug)]
pub struct DocumentView {
    pub document: Document,
    pub entry: Option<IndexEntry>,
}

/// Core get function returning structured data (used by CLI and tests).
pub async fn get_document(config: &Config, slug: &str) -> Result<Option<DocumentView>> {
    let store = DocumentStore::from_config(config);
    let document = match store.get(slug)? {
        Some(document) => document,
        None => return Ok(None),
    };
    let index = ListingIndexStore::from_config(config).load().await?;
    let entry = index.find(slug).cloned();
    Ok(Some(DocumentView { document, entry }))
}

/// CLI entry point for `press get` — prints the document to stdout.
pub async fn run_get(config: &Config, slug: &str) -> Result<()> {
    let view = match get_document(config, slug).await? {
        Some(view) => view,
        None => {
            eprintln!("Error: document not found: {}", slug);
            std::process::exit(1);
        }
    };
    let doc = &view.document;

    println!("--- Document ---");
    println!("slug:         {}", doc.slug);
    println!("id:           {}", doc.id);
    println!("topic_key:    {}", doc.topic_key);
    println!("title:        {}", doc.title);
    if let Some(ref description) = doc.description {
        println!("description:  {}", description);
    }
    println!("category:     {}", doc.category);
    if !doc.tags.is_empty() {
        println!("tags:         {}", doc.tags.join(", "));
    }
    if !doc.keywords.is_empty() {
        println!("keywords:     {}", doc.keywords.join(", "));
    }
    println!("content_hash: {}", doc.content_hash);
    println!("created_at:   {}", format_ts(&doc.created_at));
    println!("updated_at:   {}", format_ts(&doc.updated_at));
    println!("listed:       {}", listing_state(doc, view.entry.is_some()));
    println!();

    println!("--- Body ---");
    println!("{}", doc.body);

    Ok(())
}

fn listing_state(doc: &Document, has_entry: bool) -> &'static str {
    match (doc.is_listed(), has_entry) {
        (true, true) => "yes",
        (false, false) if doc.draft => "no (draft)",
        (false, false) => "no (excluded)",
        // Index and store disagree; a rebuild reconciles them.
        (true, false) => "no (missing entry, run `press rebuild`)",
        (false, true) => "yes (stale entry, run `press rebuild`)",
    }
}

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

//! Document command handlers
//!
//! Documents are references (URL or path) attached to an item. The files
//! themselves live elsewhere.

use anyhow::{Context, Result};

use worklog_core::{NewDocument, Store};

use super::{load_item, resolve_id};
use crate::editor::confirm;
use crate::output::{short_id, Output};

/// Attach a document reference to an item
pub fn add(
    store: &mut Store,
    item_id: String,
    title: String,
    location: String,
    output: &Output,
) -> Result<()> {
    let item = load_item(store, &item_id)?;
    let document = store
        .add_document(item.id, &NewDocument { title, location })
        .context("Failed to attach document")?;

    if output.is_json() {
        output.print_json(&document);
    } else {
        output.success(&format!(
            "Attached {} to item {}",
            document.title,
            short_id(&item.id)
        ));
    }
    Ok(())
}

/// Remove a document reference from an item
pub fn delete(store: &mut Store, item_id: String, doc_id: String, output: &Output) -> Result<()> {
    let item = load_item(store, &item_id)?;
    let doc_uuid = resolve_id(
        &doc_id,
        "document",
        item.documents.iter().map(|doc| (doc.id, doc.title.as_str())),
    )?;

    if output.should_prompt() {
        if let Some(doc) = item.documents.iter().find(|doc| doc.id == doc_uuid) {
            println!("Remove document: {} ({})", doc.title, doc.location);
        }
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store
        .delete_document(item.id, doc_uuid)
        .context("Failed to remove document")?;

    output.success(&format!("Removed document: {}", short_id(&doc_uuid)));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use worklog_core::{Column, NewItem};

    #[test]
    fn test_attach_and_remove_document() {
        let mut store = Store::open_in_memory().unwrap();
        let item = store
            .add_item(&NewItem::new("Survey caches", Column::Discussing))
            .unwrap();
        let output = Output::new(OutputFormat::Quiet);

        add(
            &mut store,
            item.id.to_string(),
            "Design notes".to_string(),
            "https://docs.example.com/cache".to_string(),
            &output,
        )
        .unwrap();

        let documents = store.get_item(item.id).unwrap().unwrap().documents;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].location, "https://docs.example.com/cache");

        delete(
            &mut store,
            item.id.to_string(),
            documents[0].id.to_string(),
            &output,
        )
        .unwrap();
        assert!(store.get_item(item.id).unwrap().unwrap().documents.is_empty());
    }

    #[test]
    fn test_unknown_document_is_an_error() {
        let mut store = Store::open_in_memory().unwrap();
        let item = store
            .add_item(&NewItem::new("Survey caches", Column::Ideas))
            .unwrap();
        let output = Output::new(OutputFormat::Quiet);

        let result = delete(
            &mut store,
            item.id.to_string(),
            uuid::Uuid::new_v4().to_string(),
            &output,
        );
        assert!(result.is_err());
    }
}

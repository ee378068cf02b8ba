//! Status command handler

use anyhow::Result;

use worklog_core::{partition, Column, Store};

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(store: &Store, output: &Output) -> Result<()> {
    let config = store.config();
    let snapshot = store.snapshot()?;
    let db_path = config.sqlite_path();
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let counts: Vec<(Column, usize, u64)> = Column::ALL
        .iter()
        .map(|&column| {
            (
                column,
                partition(&snapshot.items, column).len(),
                snapshot.revisions.get(&column).copied().unwrap_or(0),
            )
        })
        .collect();
    let notes: usize = snapshot.items.iter().map(|item| item.notes.len()).sum();
    let documents: usize = snapshot.items.iter().map(|item| item.documents.len()).sum();

    match output.format {
        OutputFormat::Json => {
            let columns: serde_json::Map<String, serde_json::Value> = counts
                .iter()
                .map(|(column, count, revision)| {
                    (
                        column.as_str().to_string(),
                        serde_json::json!({"items": count, "revision": revision}),
                    )
                })
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "database": db_path,
                    "database_size": db_size,
                    "server_url": config.server_url,
                    "columns": columns,
                    "counts": {
                        "items": snapshot.items.len(),
                        "notes": notes,
                        "documents": documents
                    }
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", snapshot.items.len());
        }
        OutputFormat::Human => {
            println!("worklog Status");
            println!("==============");
            println!();
            println!("Storage:");
            println!("  Database: {}", db_path.display());
            println!("  Size:     {} bytes", db_size);
            if let Some(ref url) = config.server_url {
                println!("  Server:   {}", url);
            }
            println!();
            println!("Columns:");
            for (column, count, revision) in &counts {
                println!("  {:<11} {:>4} item(s)  rev {}", column.title(), count, revision);
            }
            println!();
            println!("Contents:");
            println!("  Items:     {}", snapshot.items.len());
            println!("  Notes:     {}", notes);
            println!("  Documents: {}", documents);
        }
    }

    Ok(())
}

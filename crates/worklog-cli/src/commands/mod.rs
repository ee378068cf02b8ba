//! Command handlers

pub mod board;
pub mod config;
pub mod doc;
pub mod item;
pub mod note;
pub mod serve;
pub mod status;

use anyhow::{bail, Result};
use uuid::Uuid;

use worklog_core::{BoardItem, Store};

/// Resolve a full UUID or a unique prefix among `candidates`
///
/// `kind` names what is being looked up in error messages.
pub fn resolve_id<'a>(
    input: &str,
    kind: &str,
    candidates: impl IntoIterator<Item = (Uuid, &'a str)>,
) -> Result<Uuid> {
    let input = input.trim();
    if let Ok(uuid) = Uuid::parse_str(input) {
        return Ok(uuid);
    }
    if input.is_empty() {
        bail!("No {} ID given", kind);
    }

    let matches: Vec<_> = candidates
        .into_iter()
        .filter(|(id, _)| id.to_string().starts_with(input))
        .collect();

    match matches.as_slice() {
        [] => bail!("No {} found matching: {}", kind, input),
        [(id, _)] => Ok(*id),
        _ => {
            eprintln!("Multiple {}s match '{}':", kind, input);
            for (id, label) in &matches {
                eprintln!("  {} - {}", id, label);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}

/// Resolve an item ID against a list of items
pub fn resolve_item_id(input: &str, items: &[BoardItem]) -> Result<Uuid> {
    resolve_id(
        input,
        "item",
        items.iter().map(|item| (item.id, item.title.as_str())),
    )
}

/// Resolve an item ID and load the item from the store
pub fn load_item(store: &Store, input: &str) -> Result<BoardItem> {
    let snapshot = store.snapshot()?;
    let id = resolve_item_id(input, &snapshot.items)?;
    snapshot
        .items
        .into_iter()
        .find(|item| item.id == id)
        .ok_or_else(|| anyhow::anyhow!("Item not found: {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use worklog_core::{Column, NewItem};

    fn sample_ids() -> Vec<(Uuid, &'static str)> {
        vec![
            (
                Uuid::parse_str("aaaa1111-0000-4000-8000-000000000001").unwrap(),
                "first",
            ),
            (
                Uuid::parse_str("aaaa2222-0000-4000-8000-000000000002").unwrap(),
                "second",
            ),
        ]
    }

    #[test]
    fn test_resolve_full_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(resolve_id(&id.to_string(), "item", sample_ids()).unwrap(), id);
    }

    #[test]
    fn test_resolve_unique_prefix() {
        let ids = sample_ids();
        assert_eq!(resolve_id("aaaa2", "item", ids.clone()).unwrap(), ids[1].0);
    }

    #[test]
    fn test_resolve_ambiguous_and_missing() {
        assert!(resolve_id("aaaa", "item", sample_ids()).is_err());
        assert!(resolve_id("ffff", "item", sample_ids()).is_err());
        assert!(resolve_id("  ", "item", sample_ids()).is_err());
    }

    #[test]
    fn test_load_item_by_prefix() {
        let mut store = Store::open_in_memory().unwrap();
        let item = store
            .add_item(&NewItem::new("Investigate caching", Column::Ideas))
            .unwrap();

        let prefix = &item.id.to_string()[..8];
        let loaded = load_item(&store, prefix).unwrap();
        assert_eq!(loaded.id, item.id);
        assert_eq!(loaded.title, "Investigate caching");
    }
}

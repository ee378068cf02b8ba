//! Public/privileged board views

use serde::{Deserialize, Serialize};

use crate::models::BoardItem;

/// Who is looking at the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Anonymous viewers; private items are hidden
    Public,
    /// Callers allowed to mutate; everything is shown
    Privileged,
}

impl Visibility {
    pub fn from_privileged(privileged: bool) -> Self {
        if privileged {
            Visibility::Privileged
        } else {
            Visibility::Public
        }
    }
}

/// Drop items the viewer may not see
///
/// Positions are copied through untouched, so a public column may show
/// gaps where private items sit. Renderers order by position and never
/// display it.
pub fn filter_visible(items: &[BoardItem], visibility: Visibility, marker: &str) -> Vec<BoardItem> {
    match visibility {
        Visibility::Privileged => items.to_vec(),
        Visibility::Public => items
            .iter()
            .filter(|item| !item.is_private(marker))
            .cloned()
            .collect(),
    }
}

//! Subscription keys

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one subscription: a view name plus an optional cell.
///
/// A key without a cell is the site-wide entry for the view; lookups for a
/// specific cell fall back to it when no exact entry exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub view: String,
    pub cell: Option<String>,
}

impl SubscriptionKey {
    /// Create a key. An empty cell name is the same as no cell.
    pub fn new(view: impl Into<String>, cell: Option<String>) -> Self {
        let cell = cell.filter(|c| !c.is_empty());
        Self { view: view.into(), cell }
    }

    /// Key of the site-wide entry for a view
    pub fn site_wide(view: impl Into<String>) -> Self {
        Self { view: view.into(), cell: None }
    }

    pub fn is_site_wide(&self) -> bool {
        self.cell.is_none()
    }

    /// The key to try when this one has no entry, if any
    pub fn fallback(&self) -> Option<SubscriptionKey> {
        if self.is_site_wide() {
            None
        } else {
            Some(Self::site_wide(self.view.clone()))
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.view, self.cell.as_deref().unwrap_or(""))
    }
}

//! Partition (cell) naming
//!
//! Subscriptions name their partition by cell id. Two names are special:
//! `"fallback"` stands for the well-known fallback cell and `"site"` for
//! the whole site. The site, and the site cell once resolved, are keyed as
//! the absent partition.

use crate::core_view::model::SubscriptionKey;

/// Cell id behind the `"fallback"` alias
pub const FALLBACK_CELL: &str = "000004000000000000000000000:ULocation::Cell";

/// Alias for the whole site
pub const SITE_CELL: &str = "site";

/// Level of the site cell among the features returned by a cell query
pub const SITE_CELL_LEVEL: i64 = 3;

/// Resolve the cell aliases. Empty names mean no cell.
pub fn normalize_cell(cell: Option<&str>) -> Option<String> {
    let cell = cell.filter(|c| !c.is_empty())?;
    let normalized = match cell.to_lowercase().as_str() {
        "fallback" => FALLBACK_CELL.to_string(),
        SITE_CELL => SITE_CELL.to_string(),
        _ => cell.to_string(),
    };
    Some(normalized)
}

/// Subscription key for a view and cell, given the resolved site cell
pub fn subscription_key(view: &str, cell: Option<&str>, site_cell: Option<&str>) -> SubscriptionKey {
    let cell = cell.filter(|c| *c != SITE_CELL && Some(*c) != site_cell);
    SubscriptionKey::new(view, cell.map(str::to_string))
}

// ABOUTME: Entity kinds migrated by this tool and their fixed migration order
// ABOUTME: Maps each entity to its source table and Kreezalid API endpoint

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three record types moved to Kreezalid.
///
/// Declaration order is migration order: listings reference the remote ids
/// assigned to users and categories, so those must be migrated first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[value(name = "users")]
    User,
    #[value(name = "categories")]
    Category,
    #[value(name = "listings")]
    Listing,
}

impl EntityKind {
    /// All entity kinds in the order they must be migrated.
    pub const ALL: [EntityKind; 3] = [EntityKind::User, EntityKind::Category, EntityKind::Listing];

    /// Source table carrying the `kreezalid_id` / `imported_at` marker columns.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Category => "listing_category",
            EntityKind::Listing => "listing",
        }
    }

    /// Path segment of the create endpoint, relative to the API base URL.
    pub fn endpoint(self) -> &'static str {
        match self {
            EntityKind::User => "users",
            EntityKind::Category => "categories",
            EntityKind::Listing => "listings",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Category => "category",
            EntityKind::Listing => "listing",
        }
    }

    /// Sort and dedupe a user-supplied selection into migration order.
    ///
    /// An empty selection means "everything".
    pub fn ordered(selection: &[EntityKind]) -> Vec<EntityKind> {
        if selection.is_empty() {
            return Self::ALL.to_vec();
        }
        let mut kinds = selection.to_vec();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

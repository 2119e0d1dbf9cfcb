// ABOUTME: Source rows read from MySQL and payloads sent to the Kreezalid API
// ABOUTME: Payloads serialize to the exact JSON bodies the create endpoints expect

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned by Kreezalid and cached in the source row's `kreezalid_id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub u64);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unmigrated row of the `user` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserRow {
    pub id: u64,
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub company_name: Option<String>,
    pub profession: Option<String>,
    pub phone_prefix: Option<String>,
    pub phone: Option<String>,
    pub country_of_residence: Option<String>,
    pub time_zone: Option<String>,
    pub enabled: bool,
}

/// Unmigrated row of `listing_category`, joined with its canonical translation
/// (the translation row with the lowest id).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryRow {
    pub id: u64,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub lft: Option<i64>,
    pub rgt: Option<i64>,
    pub lvl: Option<i64>,
}

/// Unmigrated row of `listing`, with the remote ids of the user and the
/// category it references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingRow {
    pub id: u64,
    pub user_id: u64,
    pub category_id: u64,
    pub city: Option<String>,
    pub country: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub user_remote_id: RemoteId,
    pub category_remote_id: RemoteId,
}

/// Listing that cannot be migrated yet because a referenced row has no remote id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedListing {
    pub id: u64,
    /// `None` when the listing has no owner at all.
    pub user_id: Option<u64>,
    pub category_id: Option<u64>,
    pub user_migrated: bool,
    pub category_migrated: bool,
}

impl BlockedListing {
    /// Human-readable list of the references still missing a remote id.
    pub fn missing(&self) -> String {
        let mut missing = Vec::new();
        if !self.user_migrated {
            match self.user_id {
                Some(id) => missing.push(format!("user {}", id)),
                None => missing.push("owner".to_string()),
            }
        }
        if !self.category_migrated {
            match self.category_id {
                Some(id) => missing.push(format!("category {}", id)),
                None => missing.push("category link".to_string()),
            }
        }
        missing.join(", ")
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserAttributes {
    pub profession: Option<String>,
}

/// Body of `POST {endpoint}/users`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserPayload {
    pub account_type: String,
    pub address_city: Option<String>,
    pub address_country: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub address_state: Option<String>,
    pub address_zipcode: Option<String>,
    pub attributes: UserAttributes,
    pub avatar: Option<String>,
    pub business_name: Option<String>,
    pub can_post_listing: bool,
    pub email: Option<String>,
    pub external_id: u64,
    pub first_name: Option<String>,
    pub group_id: u64,
    pub locale: Option<String>,
    pub note: Option<String>,
    pub phone_country_number: Option<String>,
    pub phone_number: Option<String>,
    pub status: String,
    pub review_count: Option<u32>,
    pub timezone: Option<String>,
    pub username: Option<String>,
}

/// Body of `POST {endpoint}/categories`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryPayload {
    pub external_id: u64,
    pub title: Option<String>,
    pub page_title: Option<String>,
    pub description: Option<String>,
    pub slug: Option<String>,
    pub lft: Option<i64>,
    pub rght: Option<i64>,
    pub level: Option<i64>,
}

/// Body of `POST {endpoint}/listings`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ListingPayload {
    /// Kreezalid expects the attribute list as a JSON-encoded string.
    pub attributes: String,
    pub category_id: RemoteId,
    pub city: Option<String>,
    pub country: Option<String>,
    pub currency: String,
    pub description: Option<String>,
    pub external_id: u64,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    pub shipping_methods: Vec<serde_json::Map<String, serde_json::Value>>,
    pub user_id: RemoteId,
    pub title: String,
    pub order_type_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_listing_missing() {
        let blocked = BlockedListing {
            id: 7,
            user_id: Some(3),
            category_id: Some(9),
            user_migrated: false,
            category_migrated: false,
        };
        assert_eq!(blocked.missing(), "user 3, category 9");

        let unlinked = BlockedListing {
            id: 8,
            user_id: Some(3),
            category_id: None,
            user_migrated: true,
            category_migrated: false,
        };
        assert_eq!(unlinked.missing(), "category link");

        let orphan = BlockedListing {
            id: 9,
            user_id: None,
            category_id: Some(4),
            user_migrated: false,
            category_migrated: true,
        };
        assert_eq!(orphan.missing(), "owner");
    }

    #[test]
    fn test_remote_id_serializes_as_number() {
        let value = serde_json::to_value(RemoteId(555)).unwrap();
        assert_eq!(value, serde_json::json!(555));
        assert_eq!(RemoteId(555).to_string(), "555");
    }
}

// ABOUTME: Maps source rows to Kreezalid create payloads
// ABOUTME: Pure functions; missing data passes through as null and is only reported, never rejected

use crate::config::PayloadDefaults;
use crate::models::{
    CategoryPayload, CategoryRow, ListingPayload, ListingRow, UserAttributes, UserPayload, UserRow,
};

pub fn user_payload(row: &UserRow, defaults: &PayloadDefaults) -> UserPayload {
    UserPayload {
        account_type: defaults.account_type.clone(),
        // The source schema only records a country of residence.
        address_city: row.country_of_residence.clone(),
        address_country: row.country_of_residence.clone(),
        address_line1: None,
        address_line2: None,
        address_state: None,
        address_zipcode: None,
        attributes: UserAttributes {
            profession: row.profession.clone(),
        },
        avatar: None,
        business_name: row.company_name.clone(),
        can_post_listing: true,
        email: row.email.clone(),
        external_id: row.id,
        first_name: row.first_name.clone(),
        group_id: defaults.user_group_id,
        locale: None,
        note: None,
        phone_country_number: row.phone_prefix.clone(),
        phone_number: row.phone.clone(),
        status: if row.enabled { "enabled" } else { "disabled" }.to_string(),
        review_count: None,
        timezone: row.time_zone.clone(),
        username: row.username.clone(),
    }
}

pub fn category_payload(row: &CategoryRow) -> CategoryPayload {
    CategoryPayload {
        external_id: row.id,
        title: row.name.clone(),
        page_title: row.name.clone(),
        description: None,
        slug: row.slug.clone(),
        lft: row.lft,
        rght: row.rgt,
        level: row.lvl,
    }
}

pub fn listing_payload(row: &ListingRow, defaults: &PayloadDefaults) -> ListingPayload {
    ListingPayload {
        attributes: "[]".to_string(),
        category_id: row.category_remote_id,
        city: row.city.clone(),
        country: row.country.clone(),
        currency: defaults.currency.clone(),
        description: row.description.clone(),
        external_id: row.id,
        price: row.price,
        shipping_methods: vec![serde_json::Map::new()],
        user_id: row.user_remote_id,
        title: defaults.listing_title.clone(),
        order_type_id: defaults.order_type_id,
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Required Kreezalid user fields that the payload leaves unpopulated.
pub fn missing_user_fields(payload: &UserPayload) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if is_blank(&payload.email) {
        missing.push("email");
    }
    if is_blank(&payload.username) {
        missing.push("username");
    }
    if is_blank(&payload.first_name) {
        missing.push("first_name");
    }
    missing
}

pub fn missing_category_fields(payload: &CategoryPayload) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if is_blank(&payload.title) {
        missing.push("title");
    }
    if is_blank(&payload.slug) {
        missing.push("slug");
    }
    missing
}

pub fn missing_listing_fields(payload: &ListingPayload) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if payload.price.is_none() {
        missing.push("price");
    }
    if is_blank(&payload.description) {
        missing.push("description");
    }
    if is_blank(&payload.country) {
        missing.push("country");
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RemoteId;
    use rust_decimal::Decimal;

    fn user_row() -> UserRow {
        UserRow {
            id: 1,
            email: Some("a@x.com".to_string()),
            username: Some("alice".to_string()),
            first_name: Some("Alice".to_string()),
            company_name: Some("Acme".to_string()),
            profession: Some("Coach".to_string()),
            phone_prefix: Some("+33".to_string()),
            phone: Some("612345678".to_string()),
            country_of_residence: Some("FR".to_string()),
            time_zone: Some("Europe/Paris".to_string()),
            enabled: true,
        }
    }

    #[test]
    fn test_user_payload_maps_fields() {
        let payload = user_payload(&user_row(), &PayloadDefaults::default());
        assert_eq!(payload.status, "enabled");
        assert_eq!(payload.email.as_deref(), Some("a@x.com"));
        assert_eq!(payload.business_name.as_deref(), Some("Acme"));
        assert_eq!(payload.address_city.as_deref(), Some("FR"));
        assert_eq!(payload.address_country.as_deref(), Some("FR"));
        assert_eq!(payload.group_id, 845751);
        assert_eq!(payload.account_type, "individual");
        assert_eq!(payload.external_id, 1);
        assert!(payload.can_post_listing);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["attributes"]["profession"], "Coach");
        assert_eq!(json["phone_country_number"], "+33");
        assert!(json["address_line1"].is_null());
        assert!(json["review_count"].is_null());
    }

    #[test]
    fn test_disabled_user_status() {
        let row = UserRow {
            enabled: false,
            ..user_row()
        };
        assert_eq!(user_payload(&row, &PayloadDefaults::default()).status, "disabled");
    }

    #[test]
    fn test_missing_data_passes_through_as_null() {
        let row = UserRow {
            id: 4,
            ..Default::default()
        };
        let payload = user_payload(&row, &PayloadDefaults::default());
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["email"].is_null());
        assert_eq!(
            missing_user_fields(&payload),
            vec!["email", "username", "first_name"]
        );
    }

    #[test]
    fn test_category_payload_nested_set() {
        let row = CategoryRow {
            id: 12,
            name: Some("Yoga".to_string()),
            slug: Some("yoga".to_string()),
            lft: Some(3),
            rgt: Some(8),
            lvl: Some(1),
        };
        let json = serde_json::to_value(category_payload(&row)).unwrap();
        assert_eq!(json["external_id"], 12);
        assert_eq!(json["title"], "Yoga");
        assert_eq!(json["page_title"], "Yoga");
        assert_eq!(json["rght"], 8);
        assert_eq!(json["level"], 1);
        assert!(json["description"].is_null());
        assert!(missing_category_fields(&category_payload(&row)).is_empty());
    }

    #[test]
    fn test_listing_payload_uses_remote_ids_and_defaults() {
        let row = ListingRow {
            id: 40,
            user_id: 1,
            category_id: 12,
            city: Some("Lyon".to_string()),
            country: Some("FR".to_string()),
            description: Some("One hour session".to_string()),
            price: Some(Decimal::new(4950, 2)),
            user_remote_id: RemoteId(555),
            category_remote_id: RemoteId(777),
        };
        let payload = listing_payload(&row, &PayloadDefaults::default());
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["user_id"], 555);
        assert_eq!(json["category_id"], 777);
        assert_eq!(json["external_id"], 40);
        assert_eq!(json["currency"], "USD");
        assert_eq!(json["title"], "coaching");
        assert_eq!(json["order_type_id"], 3);
        assert_eq!(json["attributes"], "[]");
        assert_eq!(json["shipping_methods"], serde_json::json!([{}]));
        assert_eq!(json["price"], 49.5);
        assert!(missing_listing_fields(&payload).is_empty());
    }
}

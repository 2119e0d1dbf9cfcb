// ABOUTME: MySQL implementation of MigrationStore over a single mysql_async connection
// ABOUTME: Holds the SELECT/UPDATE statements for users, categories and listings

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Row};
use rust_decimal::Decimal;
use std::str::FromStr;

use super::{EntityCounts, MigrationStore};
use crate::config::DatabaseConfig;
use crate::entity::EntityKind;
use crate::models::{BlockedListing, CategoryRow, ListingRow, RemoteId, UserRow};
use crate::utils::quote_mysql_ident;

/// Columns every migrated table must carry.
pub const MARKER_COLUMNS: [&str; 2] = ["kreezalid_id", "imported_at"];

const USERS_QUERY: &str = "\
SELECT id, email, username, first_name, company_name, profession, \
       phone_prefix, phone, country_of_residence, time_zone, enabled \
FROM `user` \
WHERE imported_at IS NULL \
ORDER BY id";

// One canonical translation per category: the lowest translation id. Categories
// without any translation are still returned (name/slug NULL).
const CATEGORIES_QUERY: &str = "\
SELECT lc.id, lct.name, lct.slug, lc.lft, lc.rgt, lc.lvl \
FROM listing_category lc \
LEFT JOIN ( \
    SELECT translatable_id, MIN(id) AS translation_id \
    FROM listing_category_translation \
    GROUP BY translatable_id \
) canonical ON canonical.translatable_id = lc.id \
LEFT JOIN listing_category_translation lct ON lct.id = canonical.translation_id \
WHERE lc.imported_at IS NULL \
ORDER BY lc.lft, lc.id";

// A listing linked to several categories is sent once, under its lowest category id.
const PRIMARY_CATEGORY_LINK: &str = "\
SELECT listing_id, MIN(listing_category_id) AS listing_category_id \
FROM listing_listing_category \
GROUP BY listing_id";

fn ready_listings_query() -> String {
    format!(
        "SELECT l.id, l.user_id, link.listing_category_id AS category_id, \
                l.city, l.country, l.description, CAST(l.price AS CHAR) AS price, \
                u.kreezalid_id AS user_kreezalid_id, c.kreezalid_id AS category_kreezalid_id \
         FROM listing l \
         JOIN ({}) link ON link.listing_id = l.id \
         JOIN listing_category c ON c.id = link.listing_category_id \
         JOIN `user` u ON u.id = l.user_id \
         WHERE l.imported_at IS NULL \
           AND u.kreezalid_id IS NOT NULL \
           AND c.kreezalid_id IS NOT NULL \
         ORDER BY l.id",
        PRIMARY_CATEGORY_LINK
    )
}

fn blocked_listings_query() -> String {
    format!(
        "SELECT l.id, l.user_id, link.listing_category_id AS category_id, \
                (u.kreezalid_id IS NOT NULL) AS user_migrated, \
                (c.kreezalid_id IS NOT NULL) AS category_migrated \
         FROM listing l \
         LEFT JOIN ({}) link ON link.listing_id = l.id \
         LEFT JOIN listing_category c ON c.id = link.listing_category_id \
         LEFT JOIN `user` u ON u.id = l.user_id \
         WHERE l.imported_at IS NULL \
           AND (u.kreezalid_id IS NULL OR c.kreezalid_id IS NULL) \
         ORDER BY l.id",
        PRIMARY_CATEGORY_LINK
    )
}

fn mark_query(kind: EntityKind) -> String {
    format!(
        "UPDATE {} SET kreezalid_id = ?, imported_at = NOW() WHERE id = ?",
        quote_mysql_ident(kind.table())
    )
}

fn count_query(kind: EntityKind) -> String {
    format!(
        "SELECT COUNT(*), COUNT(imported_at) FROM {}",
        quote_mysql_ident(kind.table())
    )
}

/// Take a named column out of a row, converting it to `T`.
fn column<T: FromValue>(row: &mut Row, name: &str) -> Result<T> {
    match row.take_opt::<T, _>(name) {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(anyhow!(
            "Column '{}' holds a value of unexpected type: {:?}",
            name,
            e.0
        )),
        None => bail!("Column '{}' missing from result set", name),
    }
}

fn flag(row: &mut Row, name: &str) -> Result<bool> {
    Ok(column::<Option<i64>>(row, name)?.unwrap_or(0) != 0)
}

fn decimal(row: &mut Row, name: &str) -> Result<Option<Decimal>> {
    column::<Option<String>>(row, name)?
        .map(|raw| {
            Decimal::from_str(raw.trim())
                .with_context(|| format!("Column '{}' is not a decimal: {}", name, raw))
        })
        .transpose()
}

fn user_from_row(mut row: Row) -> Result<UserRow> {
    Ok(UserRow {
        id: column(&mut row, "id")?,
        email: column(&mut row, "email")?,
        username: column(&mut row, "username")?,
        first_name: column(&mut row, "first_name")?,
        company_name: column(&mut row, "company_name")?,
        profession: column(&mut row, "profession")?,
        phone_prefix: column(&mut row, "phone_prefix")?,
        phone: column(&mut row, "phone")?,
        country_of_residence: column(&mut row, "country_of_residence")?,
        time_zone: column(&mut row, "time_zone")?,
        enabled: flag(&mut row, "enabled")?,
    })
}

fn category_from_row(mut row: Row) -> Result<CategoryRow> {
    Ok(CategoryRow {
        id: column(&mut row, "id")?,
        name: column(&mut row, "name")?,
        slug: column(&mut row, "slug")?,
        lft: column(&mut row, "lft")?,
        rgt: column(&mut row, "rgt")?,
        lvl: column(&mut row, "lvl")?,
    })
}

fn listing_from_row(mut row: Row) -> Result<ListingRow> {
    Ok(ListingRow {
        id: column(&mut row, "id")?,
        user_id: column(&mut row, "user_id")?,
        category_id: column(&mut row, "category_id")?,
        city: column(&mut row, "city")?,
        country: column(&mut row, "country")?,
        description: column(&mut row, "description")?,
        price: decimal(&mut row, "price")?,
        user_remote_id: RemoteId(column(&mut row, "user_kreezalid_id")?),
        category_remote_id: RemoteId(column(&mut row, "category_kreezalid_id")?),
    })
}

fn blocked_from_row(mut row: Row) -> Result<BlockedListing> {
    Ok(BlockedListing {
        id: column(&mut row, "id")?,
        user_id: column(&mut row, "user_id")?,
        category_id: column(&mut row, "category_id")?,
        user_migrated: flag(&mut row, "user_migrated")?,
        category_migrated: flag(&mut row, "category_migrated")?,
    })
}

/// The one source-database connection used for a whole run.
pub struct MysqlStore {
    conn: Conn,
}

impl MysqlStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        tracing::info!("Connecting to source database {}", config.display_url());
        let conn = Conn::new(config.to_opts())
            .await
            .with_context(|| format!("Failed to connect to {}", config.display_url()))?;
        Ok(Self { conn })
    }

    /// Close the connection cleanly.
    pub async fn disconnect(self) -> Result<()> {
        self.conn
            .disconnect()
            .await
            .context("Failed to close source database connection")
    }

    pub async fn ping(&mut self) -> Result<()> {
        self.conn
            .ping()
            .await
            .context("Source database did not answer ping")
    }

    /// Column names of `table` in the current database; empty if the table does not exist.
    pub async fn column_names(&mut self, table: &str) -> Result<Vec<String>> {
        self.conn
            .exec(
                "SELECT COLUMN_NAME FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION",
                (table,),
            )
            .await
            .with_context(|| format!("Failed to list columns of table '{}'", table))
    }

    async fn fetch<T>(&mut self, query: &str, what: &str, map: fn(Row) -> Result<T>) -> Result<Vec<T>> {
        let rows: Vec<Row> = self
            .conn
            .query(query)
            .await
            .with_context(|| format!("Failed to read unmigrated {}", what))?;
        rows.into_iter()
            .map(map)
            .collect::<Result<Vec<T>>>()
            .with_context(|| format!("Failed to decode {} row", what))
    }
}

#[async_trait]
impl MigrationStore for MysqlStore {
    async fn fetch_unmigrated_users(&mut self) -> Result<Vec<UserRow>> {
        self.fetch(USERS_QUERY, "users", user_from_row).await
    }

    async fn fetch_unmigrated_categories(&mut self) -> Result<Vec<CategoryRow>> {
        self.fetch(CATEGORIES_QUERY, "categories", category_from_row)
            .await
    }

    async fn fetch_ready_listings(&mut self) -> Result<Vec<ListingRow>> {
        self.fetch(&ready_listings_query(), "listings", listing_from_row)
            .await
    }

    async fn fetch_blocked_listings(&mut self) -> Result<Vec<BlockedListing>> {
        self.fetch(&blocked_listings_query(), "blocked listings", blocked_from_row)
            .await
    }

    async fn mark_migrated(
        &mut self,
        kind: EntityKind,
        row_id: u64,
        remote_id: RemoteId,
    ) -> Result<u64> {
        self.conn
            .exec_drop(mark_query(kind), (remote_id.0, row_id))
            .await
            .with_context(|| format!("Failed to mark {} {} as migrated", kind, row_id))?;
        Ok(self.conn.affected_rows())
    }

    async fn count_rows(&mut self, kind: EntityKind) -> Result<EntityCounts> {
        let counts: Option<(u64, u64)> = self
            .conn
            .query_first(count_query(kind))
            .await
            .with_context(|| format!("Failed to count rows of {}", kind.table()))?;
        let (total, migrated) = counts.unwrap_or((0, 0));
        Ok(EntityCounts { total, migrated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_queries_exclude_migrated_rows() {
        assert!(USERS_QUERY.contains("WHERE imported_at IS NULL"));
        assert!(CATEGORIES_QUERY.contains("WHERE lc.imported_at IS NULL"));
        assert!(ready_listings_query().contains("WHERE l.imported_at IS NULL"));
        assert!(blocked_listings_query().contains("WHERE l.imported_at IS NULL"));
    }

    #[test]
    fn test_canonical_translation_is_lowest_id() {
        assert!(CATEGORIES_QUERY.contains("MIN(id) AS translation_id"));
        assert!(CATEGORIES_QUERY.contains("GROUP BY translatable_id"));
    }

    #[test]
    fn test_ready_listings_require_remote_references() {
        let query = ready_listings_query();
        assert!(query.contains("u.kreezalid_id IS NOT NULL"));
        assert!(query.contains("c.kreezalid_id IS NOT NULL"));
        assert!(query.contains("MIN(listing_category_id)"));
    }

    #[test]
    fn test_mark_query_targets_primary_key() {
        assert_eq!(
            mark_query(EntityKind::User),
            "UPDATE `user` SET kreezalid_id = ?, imported_at = NOW() WHERE id = ?"
        );
        assert_eq!(
            mark_query(EntityKind::Category),
            "UPDATE `listing_category` SET kreezalid_id = ?, imported_at = NOW() WHERE id = ?"
        );
    }

    #[test]
    fn test_count_query() {
        assert_eq!(
            count_query(EntityKind::Listing),
            "SELECT COUNT(*), COUNT(imported_at) FROM `listing`"
        );
    }
}

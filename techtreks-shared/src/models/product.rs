/// Marketplace product listings
///
/// A listing belongs to the verified user who created it. Only that user may
/// change or remove it. Hidden listings (`is_public = false`) are visible to
/// their seller alone.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE product_condition AS ENUM ('new', 'like-new', 'good', 'fair', 'poor');
/// CREATE TYPE product_status AS ENUM ('active', 'sold', 'reserved');
///
/// CREATE TABLE products (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     seller_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     title VARCHAR(120) NOT NULL,
///     description TEXT NOT NULL DEFAULT '',
///     price_cents BIGINT NOT NULL CHECK (price_cents > 0),
///     category VARCHAR(50) NOT NULL,
///     condition product_condition NOT NULL,
///     quantity INTEGER NOT NULL DEFAULT 1 CHECK (quantity >= 0),
///     status product_status NOT NULL DEFAULT 'active',
///     is_public BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

pub const MAX_TITLE_CHARS: usize = 120;
pub const MAX_DESCRIPTION_CHARS: usize = 5000;
pub const MAX_CATEGORY_CHARS: usize = 50;

/// Physical condition of the item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "product_condition", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ProductCondition {
    New,
    LikeNew,
    Good,
    Fair,
    Poor,
}

impl ProductCondition {
    pub const ALL: [ProductCondition; 5] = [
        ProductCondition::New,
        ProductCondition::LikeNew,
        ProductCondition::Good,
        ProductCondition::Fair,
        ProductCondition::Poor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCondition::New => "new",
            ProductCondition::LikeNew => "like-new",
            ProductCondition::Good => "good",
            ProductCondition::Fair => "fair",
            ProductCondition::Poor => "poor",
        }
    }
}

impl fmt::Display for ProductCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("condition must be one of: {}", join(&Self::ALL)))
    }
}

/// Sale state of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "product_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Sold,
    Reserved,
}

impl ProductStatus {
    pub const ALL: [ProductStatus; 3] = [
        ProductStatus::Active,
        ProductStatus::Sold,
        ProductStatus::Reserved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Sold => "sold",
            ProductStatus::Reserved => "reserved",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("status must be one of: {}", join(&Self::ALL)))
    }
}

fn join<T: fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,

    /// User who listed the product
    pub seller_id: Uuid,

    pub title: String,
    pub description: String,

    /// Asking price in cents
    pub price_cents: i64,

    pub category: String,
    pub condition: ProductCondition,
    pub quantity: i32,
    pub status: ProductStatus,

    /// Hidden listings are only shown to their seller
    pub is_public: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for a new listing
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub seller_id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub category: String,
    pub condition: ProductCondition,
    pub quantity: i32,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl NewProduct {
    /// Materialises the row as it will be stored
    pub fn into_record(self) -> Product {
        Product {
            id: Uuid::new_v4(),
            seller_id: self.seller_id,
            title: self.title,
            description: self.description,
            price_cents: self.price_cents,
            category: self.category,
            condition: self.condition,
            quantity: self.quantity,
            status: ProductStatus::Active,
            is_public: self.is_public,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

impl Product {
    /// Whether `viewer` may see this listing at all
    pub fn is_visible_to(&self, viewer: Option<Uuid>) -> bool {
        self.is_public || viewer == Some(self.seller_id)
    }

    /// Whether the listing appears on its seller's page for other users
    pub fn is_listed(&self) -> bool {
        self.is_public && self.status == ProductStatus::Active
    }

    pub async fn insert<'e, E>(executor: E, data: NewProduct) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products
                (seller_id, title, description, price_cents, category, condition,
                 quantity, is_public, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING id, seller_id, title, description, price_cents, category, condition,
                      quantity, status, is_public, created_at, updated_at
            "#,
        )
        .bind(data.seller_id)
        .bind(data.title)
        .bind(data.description)
        .bind(data.price_cents)
        .bind(data.category)
        .bind(data.condition)
        .bind(data.quantity)
        .bind(data.is_public)
        .bind(data.created_at)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Product>(
            r#"
            SELECT id, seller_id, title, description, price_cents, category, condition,
                   quantity, status, is_public, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Writes every editable field of `product` back to its row
    ///
    /// Only matches while the row still belongs to `product.seller_id`.
    /// Returns `None` if the listing is gone.
    pub async fn update<'e, E>(executor: E, product: &Product) -> Result<Option<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET title = $3, description = $4, price_cents = $5, category = $6,
                condition = $7, quantity = $8, status = $9, is_public = $10,
                updated_at = $11
            WHERE id = $1 AND seller_id = $2
            RETURNING id, seller_id, title, description, price_cents, category, condition,
                      quantity, status, is_public, created_at, updated_at
            "#,
        )
        .bind(product.id)
        .bind(product.seller_id)
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(&product.category)
        .bind(product.condition)
        .bind(product.quantity)
        .bind(product.status)
        .bind(product.is_public)
        .bind(product.updated_at)
        .fetch_optional(executor)
        .await
    }

    /// Deletes the listing if it belongs to `seller_id`
    pub async fn delete_owned<'e, E>(
        executor: E,
        id: Uuid,
        seller_id: Uuid,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM products WHERE id = $1 AND seller_id = $2")
            .bind(id)
            .bind(seller_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// A seller's listings, newest first
    ///
    /// With `listed_only`, hidden listings and those no longer active are left out.
    pub async fn list_by_seller<'e, E>(
        executor: E,
        seller_id: Uuid,
        listed_only: bool,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, Product>(
            r#"
            SELECT id, seller_id, title, description, price_cents, category, condition,
                   quantity, status, is_public, created_at, updated_at
            FROM products
            WHERE seller_id = $1
              AND (NOT $2 OR (is_public AND status = 'active'))
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(seller_id)
        .bind(listed_only)
        .fetch_all(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(is_public: bool, status: ProductStatus) -> Product {
        let mut product = NewProduct {
            seller_id: Uuid::new_v4(),
            title: "Desk lamp".to_string(),
            description: String::new(),
            price_cents: 1500,
            category: "furniture".to_string(),
            condition: ProductCondition::Good,
            quantity: 1,
            is_public,
            created_at: Utc::now(),
        }
        .into_record();
        product.status = status;
        product
    }

    #[test]
    fn test_condition_parsing() {
        assert_eq!("like-new".parse::<ProductCondition>(), Ok(ProductCondition::LikeNew));
        assert_eq!(
            "mint".parse::<ProductCondition>().unwrap_err(),
            "condition must be one of: new, like-new, good, fair, poor"
        );
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("sold".parse::<ProductStatus>(), Ok(ProductStatus::Sold));
        assert_eq!(
            "gone".parse::<ProductStatus>().unwrap_err(),
            "status must be one of: active, sold, reserved"
        );
    }

    #[test]
    fn test_serialized_names_match_storage() {
        let json = serde_json::to_value(ProductCondition::LikeNew).unwrap();
        assert_eq!(json, "like-new");
        let json = serde_json::to_value(ProductStatus::Reserved).unwrap();
        assert_eq!(json, "reserved");
    }

    #[test]
    fn test_visibility() {
        let hidden = product(false, ProductStatus::Active);
        assert!(!hidden.is_visible_to(None));
        assert!(!hidden.is_visible_to(Some(Uuid::new_v4())));
        assert!(hidden.is_visible_to(Some(hidden.seller_id)));
        assert!(!hidden.is_listed());

        let sold = product(true, ProductStatus::Sold);
        assert!(sold.is_visible_to(None));
        assert!(!sold.is_listed());

        assert!(product(true, ProductStatus::Active).is_listed());
    }
}

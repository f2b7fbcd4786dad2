/// Marketplace listings
///
/// Any verified user can list a product. Changing or removing a listing is
/// reserved to its seller; everybody else gets [`AuthError::Forbidden`].
/// Hidden listings behave as if they did not exist for anyone but the seller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::auth::error::{AuthError, AuthResult};
use crate::models::{
    product::{
        NewProduct, Product, ProductCondition, ProductStatus, MAX_CATEGORY_CHARS,
        MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS,
    },
    user::PublicUser,
};
use crate::store::Store;

/// Fields of a new listing as submitted
#[derive(Debug, Clone, Default)]
pub struct ProductDraft {
    pub title: String,
    pub description: String,
    pub price_cents: Option<i64>,
    pub category: String,
    pub condition: String,

    /// Defaults to 1
    pub quantity: Option<i32>,

    /// Defaults to public
    pub is_public: Option<bool>,
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub quantity: Option<i32>,
    pub status: Option<String>,
    pub is_public: Option<bool>,
}

/// A seller and the listings the viewer may see
#[derive(Debug, Clone)]
pub struct SellerListings {
    pub seller: PublicUser,
    pub products: Vec<Product>,
}

pub struct ProductService {
    store: Arc<dyn Store>,
}

impl ProductService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Lists a new product for `seller`
    pub async fn create(
        &self,
        seller: &PublicUser,
        draft: ProductDraft,
        now: DateTime<Utc>,
    ) -> AuthResult<Product> {
        let title = checked_text(&draft.title, "title", "title is required", MAX_TITLE_CHARS)?;
        let price_cents = draft
            .price_cents
            .filter(|price| *price > 0)
            .ok_or_else(|| invalid("valid price is required"))?;
        let category = checked_text(
            &draft.category,
            "category",
            "category is required",
            MAX_CATEGORY_CHARS,
        )?;
        let condition = draft
            .condition
            .trim()
            .parse::<ProductCondition>()
            .map_err(AuthError::Validation)?;
        let description = checked_description(&draft.description)?;
        let quantity = checked_quantity(draft.quantity.unwrap_or(1))?;

        let product = self
            .store
            .insert_product(NewProduct {
                seller_id: seller.id,
                title,
                description,
                price_cents,
                category,
                condition,
                quantity,
                is_public: draft.is_public.unwrap_or(true),
                created_at: now,
            })
            .await?;

        info!(product_id = %product.id, seller_id = %seller.id, "Product listed");
        Ok(product)
    }

    /// A single listing, if `viewer` may see it
    pub async fn get(&self, viewer: Option<&PublicUser>, id: Uuid) -> AuthResult<Product> {
        self.store
            .find_product(id)
            .await?
            .filter(|product| product.is_visible_to(viewer.map(|v| v.id)))
            .ok_or_else(product_not_found)
    }

    /// Applies `changes` to a listing owned by `editor`
    ///
    /// Nothing is written unless every supplied field is valid.
    pub async fn update(
        &self,
        editor: &PublicUser,
        id: Uuid,
        changes: ProductChanges,
        now: DateTime<Utc>,
    ) -> AuthResult<Product> {
        let mut product = self.owned(editor, id).await?;

        if let Some(title) = changes.title {
            product.title =
                checked_text(&title, "title", "title cannot be empty", MAX_TITLE_CHARS)?;
        }
        if let Some(description) = changes.description {
            product.description = checked_description(&description)?;
        }
        if let Some(price_cents) = changes.price_cents {
            if price_cents <= 0 {
                return Err(invalid("price must be positive"));
            }
            product.price_cents = price_cents;
        }
        if let Some(category) = changes.category {
            product.category = checked_text(
                &category,
                "category",
                "category cannot be empty",
                MAX_CATEGORY_CHARS,
            )?;
        }
        if let Some(condition) = changes.condition {
            product.condition = condition.trim().parse().map_err(AuthError::Validation)?;
        }
        if let Some(quantity) = changes.quantity {
            product.quantity = checked_quantity(quantity)?;
        }
        if let Some(status) = changes.status {
            product.status = status
                .trim()
                .parse::<ProductStatus>()
                .map_err(AuthError::Validation)?;
        }
        if let Some(is_public) = changes.is_public {
            product.is_public = is_public;
        }
        product.updated_at = now;

        let product = self
            .store
            .update_product(&product)
            .await?
            .ok_or_else(product_not_found)?;

        info!(product_id = %product.id, seller_id = %editor.id, "Product updated");
        Ok(product)
    }

    /// Removes a listing owned by `owner`
    pub async fn delete(&self, owner: &PublicUser, id: Uuid) -> AuthResult<()> {
        let product = self.owned(owner, id).await?;

        if !self.store.delete_product(product.id, owner.id).await? {
            return Err(product_not_found());
        }

        info!(product_id = %id, seller_id = %owner.id, "Product deleted");
        Ok(())
    }

    /// Listings of one seller, newest first
    ///
    /// The seller sees all of their listings; anyone else only public ones
    /// that are still active.
    pub async fn list_by_seller(
        &self,
        viewer: Option<&PublicUser>,
        seller_id: Uuid,
    ) -> AuthResult<SellerListings> {
        let seller = self
            .store
            .find_user_by_id(seller_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("user not found".to_string()))?
            .to_public();

        let own_page = viewer.is_some_and(|v| v.id == seller.id);
        let products = self
            .store
            .list_products_by_seller(seller.id, !own_page)
            .await?;

        Ok(SellerListings { seller, products })
    }

    /// Loads a listing `user` may change: 404 when missing or hidden from
    /// them, 403 when it belongs to someone else
    async fn owned(&self, user: &PublicUser, id: Uuid) -> AuthResult<Product> {
        let product = self.get(Some(user), id).await?;
        if product.seller_id != user.id {
            return Err(AuthError::Forbidden("permission denied".to_string()));
        }
        Ok(product)
    }
}

fn invalid(message: &str) -> AuthError {
    AuthError::Validation(message.to_string())
}

fn product_not_found() -> AuthError {
    AuthError::NotFound("product not found".to_string())
}

/// Trims a required text field and enforces its length
fn checked_text(value: &str, field: &str, empty: &str, max_chars: usize) -> AuthResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(invalid(empty));
    }
    if value.chars().count() > max_chars {
        return Err(AuthError::Validation(format!(
            "{} must be at most {} characters",
            field, max_chars
        )));
    }
    Ok(value.to_string())
}

fn checked_description(value: &str) -> AuthResult<String> {
    let value = value.trim();
    if value.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(AuthError::Validation(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_CHARS
        )));
    }
    Ok(value.to_string())
}

fn checked_quantity(quantity: i32) -> AuthResult<i32> {
    if quantity < 0 {
        return Err(invalid("quantity must be non-negative"));
    }
    Ok(quantity)
}

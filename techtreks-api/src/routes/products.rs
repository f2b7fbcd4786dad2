/// Product listing endpoints
///
/// Reading is open to everyone; hidden listings only show up for their
/// seller. Creating requires a session, and only the seller may change or
/// remove a listing.
///
/// # Endpoints
///
/// - `POST   /products` - List a product
/// - `GET    /products/:id` - One listing
/// - `PUT    /products/:id` - Update own listing (partial)
/// - `DELETE /products/:id` - Remove own listing
/// - `GET    /products/user/:user_id` - A seller's listings, newest first

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::session::Session,
    routes::{auth::OkResponse, ApiJson},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use techtreks_shared::{
    models::product::Product,
    products::{ProductChanges, ProductDraft},
};
use uuid::Uuid;

/// Create-product request
#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Asking price in cents
    pub price_cents: Option<i64>,

    #[serde(default)]
    pub category: String,

    /// One of `new`, `like-new`, `good`, `fair`, `poor`
    #[serde(default)]
    pub condition: String,

    pub quantity: Option<i32>,
    pub is_public: Option<bool>,
}

impl From<CreateProductRequest> for ProductDraft {
    fn from(req: CreateProductRequest) -> Self {
        Self {
            title: req.title,
            description: req.description,
            price_cents: req.price_cents,
            category: req.category,
            condition: req.condition,
            quantity: req.quantity,
            is_public: req.is_public,
        }
    }
}

/// Update-product request; omitted fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub category: Option<String>,
    pub condition: Option<String>,
    pub quantity: Option<i32>,

    /// One of `active`, `sold`, `reserved`
    pub status: Option<String>,

    pub is_public: Option<bool>,
}

impl From<UpdateProductRequest> for ProductChanges {
    fn from(req: UpdateProductRequest) -> Self {
        Self {
            title: req.title,
            description: req.description,
            price_cents: req.price_cents,
            category: req.category,
            condition: req.condition,
            quantity: req.quantity,
            status: req.status,
            is_public: req.is_public,
        }
    }
}

/// Acknowledgement carrying the stored listing
#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub ok: bool,
    pub msg: &'static str,
    pub product: Product,
}

/// Seller identity shown next to their listings
#[derive(Debug, Serialize)]
pub struct SellerSummary {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct SellerProductsResponse {
    pub seller: SellerSummary,
    pub items: Vec<Product>,
}

/// Ids that are not UUIDs cannot name anything
fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("{} not found", what)))
}

/// List a product
///
/// # Request Body
///
/// ```json
/// {
///   "title": "Desk lamp",
///   "price_cents": 1500,
///   "category": "furniture",
///   "condition": "like-new",
///   "description": "Warm light, barely used",
///   "quantity": 1,
///   "is_public": true
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Missing or invalid field
/// - `401 Unauthorized`: Not logged in
pub async fn create_product(
    State(state): State<AppState>,
    Session(ctx): Session,
    ApiJson(req): ApiJson<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<ProductResponse>)> {
    let seller = state.authenticator.require_user(&ctx).await?;

    let product = state.products.create(&seller, req.into(), ctx.now).await?;

    Ok((
        StatusCode::CREATED,
        Json(ProductResponse {
            ok: true,
            msg: "product created",
            product,
        }),
    ))
}

/// One listing
///
/// # Errors
///
/// - `404 Not Found`: Unknown id, or hidden from the caller
pub async fn get_product(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<Product>> {
    let id = parse_id(&id, "product")?;
    let viewer = state.authenticator.current_user(&ctx).await?;

    let product = state.products.get(viewer.as_ref(), id).await?;
    Ok(Json(product))
}

/// Update own listing
///
/// # Errors
///
/// - `400 Bad Request`: A supplied field is invalid; nothing is changed
/// - `401 Unauthorized`: Not logged in
/// - `403 Forbidden`: Listing belongs to another user
/// - `404 Not Found`: Unknown id
pub async fn update_product(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateProductRequest>,
) -> ApiResult<Json<ProductResponse>> {
    let editor = state.authenticator.require_user(&ctx).await?;
    let id = parse_id(&id, "product")?;

    let product = state
        .products
        .update(&editor, id, req.into(), ctx.now)
        .await?;

    Ok(Json(ProductResponse {
        ok: true,
        msg: "product updated",
        product,
    }))
}

/// Remove own listing
///
/// # Errors
///
/// - `401 Unauthorized`: Not logged in
/// - `403 Forbidden`: Listing belongs to another user
/// - `404 Not Found`: Unknown id
pub async fn delete_product(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    let owner = state.authenticator.require_user(&ctx).await?;
    let id = parse_id(&id, "product")?;

    state.products.delete(&owner, id).await?;
    Ok(Json(OkResponse::new("product deleted")))
}

/// A seller's listings
///
/// Sellers see everything they listed; other callers see public, active
/// listings only.
///
/// # Errors
///
/// - `404 Not Found`: Unknown user
pub async fn seller_products(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(user_id): Path<String>,
) -> ApiResult<Json<SellerProductsResponse>> {
    let seller_id = parse_id(&user_id, "user")?;
    let viewer = state.authenticator.current_user(&ctx).await?;

    let listings = state
        .products
        .list_by_seller(viewer.as_ref(), seller_id)
        .await?;

    Ok(Json(SellerProductsResponse {
        seller: SellerSummary {
            id: listings.seller.id,
            username: listings.seller.username,
        },
        items: listings.products,
    }))
}

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Product, ProductVariant};

#[derive(Debug, Deserialize, ToSchema)]
pub struct VariantInput {
    pub size: String,
    pub color: String,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub name: String,
    pub category: Option<String>,
    pub original_price: i64,
    pub sale_price: Option<i64>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub image: Option<String>,
    #[serde(default)]
    pub extra_images: Vec<String>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub variants: Vec<VariantInput>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub category: Option<String>,
    pub original_price: Option<i64>,
    pub sale_price: Option<i64>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub image: Option<String>,
    pub extra_images: Option<Vec<String>>,
    pub stock: Option<i32>,
    /// When present, replaces the full variant list.
    pub variants: Option<Vec<VariantInput>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductWithVariants {
    pub product: Product,
    pub variants: Vec<ProductVariant>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductList {
    pub items: Vec<Product>,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct LowStockProduct {
    pub id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub status: String,
    /// Sum of variant quantities, or the flat counter for variant-less
    /// products.
    pub available: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LowStockList {
    pub items: Vec<LowStockProduct>,
}
